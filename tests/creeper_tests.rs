//! Creeper agent unit tests

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Point3};
    use nightwood::audio::{Listener, ScreamVoice};
    use nightwood::creeper::{
        AnimationRole, AnimationSet, Creeper, CreeperParams, CreeperState,
    };
    use nightwood::player::{PlayerState, Stance};
    use nightwood::world::Forest;

    fn make_creeper(position: Point3<f32>, params: CreeperParams) -> Creeper {
        Creeper::new(1, position, params, ScreamVoice::new(None))
    }

    fn listener_at(x: f32, z: f32) -> Listener {
        Listener {
            position: Point3::new(x, 0.0, z),
            yaw: 0.0,
        }
    }

    fn instant_params() -> CreeperParams {
        CreeperParams {
            spawn_delay: 0.0,
            ..CreeperParams::default()
        }
    }

    // -----------------------------------------------------------------------
    // Detection gating
    // -----------------------------------------------------------------------

    #[test]
    fn detection_never_activates_before_spawn_delay() {
        let params = CreeperParams {
            spawn_delay: 5.0,
            ..CreeperParams::default()
        };
        let mut creeper = make_creeper(Point3::new(0.0, 0.0, 10.0), params);
        let forest = Forest::new(1);
        let player = PlayerState::default();
        let listener = listener_at(0.0, 0.0);

        // 4.9 simulated seconds: in plain sight the whole time, but the
        // grace period holds.
        for _ in 0..49 {
            creeper.update(0.1, &player, &listener, &forest);
            assert!(!creeper.can_see_player);
            assert_ne!(creeper.state, CreeperState::Chasing);
        }

        // Push past the delay; now the creeper locks on.
        for _ in 0..3 {
            creeper.update(0.1, &player, &listener, &forest);
        }
        assert!(creeper.detection_active);
        assert!(creeper.can_see_player);
        assert_eq!(creeper.state, CreeperState::Chasing);
    }

    // -----------------------------------------------------------------------
    // Chase scenarios from the behavior contract
    // -----------------------------------------------------------------------

    #[test]
    fn spots_player_at_ten_units_after_one_tick() {
        let mut creeper = make_creeper(Point3::new(100.0, 0.0, 110.0), instant_params());
        let forest = Forest::new(1);
        let player = PlayerState::default();
        let listener = listener_at(100.0, 100.0);

        creeper.update(0.016, &player, &listener, &forest);

        assert!(creeper.can_see_player);
        assert_eq!(creeper.state, CreeperState::Chasing);
    }

    #[test]
    fn crouching_in_grass_hides_player_at_ten_units() {
        let mut creeper = make_creeper(Point3::new(100.0, 0.0, 110.0), instant_params());
        let forest = Forest::new(1);
        let player = PlayerState {
            stance: Stance::Crouching,
            is_in_grass: true,
            ..PlayerState::default()
        };
        let listener = listener_at(100.0, 100.0);

        assert!(creeper.effective_detection_range(&player) <= 4.5);

        creeper.update(0.016, &player, &listener, &forest);
        assert!(!creeper.can_see_player);
        assert_eq!(creeper.state, CreeperState::Idle);
    }

    #[test]
    fn losing_sight_drops_back_to_idle_and_stops_screaming() {
        let mut creeper = make_creeper(Point3::new(0.0, 0.0, 10.0), instant_params());
        let forest = Forest::new(1);
        let player = PlayerState::default();

        creeper.update(0.016, &player, &listener_at(0.0, 0.0), &forest);
        assert_eq!(creeper.state, CreeperState::Chasing);

        // Player teleports out of range.
        creeper.update(0.016, &player, &listener_at(1000.0, 1000.0), &forest);
        assert_eq!(creeper.state, CreeperState::Idle);
        assert!(!creeper.voice.is_screaming);
        assert!(creeper.state_timer < 0.1);
    }

    // -----------------------------------------------------------------------
    // Stealth modifiers
    // -----------------------------------------------------------------------

    #[test]
    fn stealth_modifiers_are_monotonic() {
        let creeper = make_creeper(Point3::new(0.0, 0.0, 0.0), CreeperParams::default());

        let standing = PlayerState::default();
        let crouching = PlayerState {
            stance: Stance::Crouching,
            ..PlayerState::default()
        };
        let crouching_in_grass = PlayerState {
            stance: Stance::Crouching,
            is_in_grass: true,
            ..PlayerState::default()
        };

        let r_stand = creeper.effective_detection_range(&standing);
        let r_crouch = creeper.effective_detection_range(&crouching);
        let r_grass = creeper.effective_detection_range(&crouching_in_grass);
        assert!(r_crouch <= r_stand);
        assert!(r_grass <= r_crouch);

        // Noise widens the range, up to +50%.
        let noisy = PlayerState {
            noise_level: 1.0,
            ..PlayerState::default()
        };
        let r_noisy = creeper.effective_detection_range(&noisy);
        assert!(r_noisy > r_stand);
        assert!(r_noisy <= r_stand * 1.5 + 1e-3);

        // Standing in grass without crouching gives no grass bonus.
        let standing_in_grass = PlayerState {
            is_in_grass: true,
            ..PlayerState::default()
        };
        assert_eq!(
            creeper.effective_detection_range(&standing_in_grass),
            r_stand
        );
    }

    // -----------------------------------------------------------------------
    // Speed ordering
    // -----------------------------------------------------------------------

    #[test]
    fn chase_is_always_faster_than_wander() {
        let creeper = make_creeper(Point3::new(0.0, 0.0, 0.0), CreeperParams::default());
        assert!(creeper.chase_speed > creeper.wander_speed);
        assert!(creeper.wander_speed > 0.0);

        // A bad configuration is corrected rather than trusted.
        let bad = CreeperParams {
            wander_speed: 3.0,
            chase_speed: 1.0,
            ..CreeperParams::default()
        };
        let corrected = make_creeper(Point3::new(0.0, 0.0, 0.0), bad);
        assert!(corrected.chase_speed > corrected.wander_speed);
    }

    // -----------------------------------------------------------------------
    // State machine closure
    // -----------------------------------------------------------------------

    #[test]
    fn settles_into_idle_wander_cycle_without_sightings() {
        let mut creeper = make_creeper(Point3::new(0.0, 0.0, 10.0), instant_params());
        let forest = Forest::new(1);
        let player = PlayerState::default();
        let listener = listener_at(5000.0, 5000.0);

        let mut saw_idle = false;
        let mut saw_wandering = false;
        for _ in 0..10_000 {
            creeper.update(0.05, &player, &listener, &forest);
            match creeper.state {
                CreeperState::Idle => saw_idle = true,
                CreeperState::Wandering => saw_wandering = true,
                CreeperState::Chasing => panic!("chased without ever seeing the player"),
            }
        }
        assert!(saw_idle && saw_wandering);
    }

    #[test]
    fn wander_targets_stay_in_the_configured_band() {
        let forest = Forest::new(1);
        let player = PlayerState::default();
        let listener = listener_at(5000.0, 5000.0);

        // Sample several wander transitions; targets are picked relative
        // to the position at transition time.
        for _ in 0..10 {
            let mut creeper = make_creeper(Point3::new(0.0, 0.0, 0.0), instant_params());
            loop {
                let before = creeper.position;
                creeper.update(0.1, &player, &listener, &forest);
                if creeper.state == CreeperState::Wandering {
                    let distance = (creeper.target_position - before).magnitude();
                    assert!(
                        (19.99..=50.01).contains(&distance),
                        "wander target {distance} units away"
                    );
                    assert_eq!(creeper.target_position.y, 0.0);
                    break;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    #[test]
    fn movement_never_overshoots_the_target() {
        let mut creeper = make_creeper(Point3::new(0.0, 0.0, 4.0), instant_params());
        let forest = Forest::new(1);
        let player = PlayerState::default();
        let listener = listener_at(0.0, 0.0);

        // One enormous tick: the step is clamped to the remaining
        // distance instead of flying past the player.
        creeper.update(10.0, &player, &listener, &forest);
        assert!(creeper.position.z >= -1e-3);
        assert!((creeper.position - Point3::new(0.0, 0.0, 0.0)).magnitude() <= 4.0);
    }

    #[test]
    fn chasing_faces_the_player() {
        let mut creeper = make_creeper(Point3::new(0.0, 0.0, 10.0), instant_params());
        let forest = Forest::new(1);
        let player = PlayerState::default();
        creeper.update(0.016, &player, &listener_at(0.0, 0.0), &forest);
        // Player is at -z: yaw = atan2(0, -1) = pi.
        assert!((creeper.yaw.abs() - std::f32::consts::PI).abs() < 1e-3);
    }

    // -----------------------------------------------------------------------
    // Occlusion
    // -----------------------------------------------------------------------

    #[test]
    fn tree_between_creeper_and_player_blocks_sight() {
        let mut forest = Forest::new(1);
        forest.trees.insert(
            (0, 0),
            nightwood::world::Obstacle {
                position: Point3::new(0.0, 0.0, 5.0),
                radius: 2.0,
            },
        );
        let mut creeper = make_creeper(Point3::new(0.0, 0.0, 10.0), instant_params());
        let player = PlayerState::default();

        creeper.update(0.016, &player, &listener_at(0.0, 0.0), &forest);
        assert!(!creeper.can_see_player);
        assert_eq!(creeper.state, CreeperState::Idle);
    }

    // -----------------------------------------------------------------------
    // Fade-in lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn fade_in_waits_for_its_delay_then_ramps() {
        let params = CreeperParams {
            fade_delay: 1.0,
            initially_visible: false,
            initial_opacity: 0.0,
            spawn_delay: 30.0,
            ..CreeperParams::default()
        };
        let mut creeper = make_creeper(Point3::new(0.0, 0.0, 50.0), params);
        let forest = Forest::new(1);
        let player = PlayerState::default();
        let listener = listener_at(0.0, 0.0);

        for _ in 0..5 {
            creeper.update(0.1, &player, &listener, &forest);
        }
        assert!(!creeper.visible);
        assert_eq!(creeper.opacity, 0.0);

        for _ in 0..8 {
            creeper.update(0.1, &player, &listener, &forest);
        }
        assert!(creeper.visible);
        assert!(creeper.opacity > 0.0 && creeper.opacity < 1.0);

        for _ in 0..20 {
            creeper.update(0.1, &player, &listener, &forest);
        }
        assert_eq!(creeper.opacity, 1.0);
    }

    // -----------------------------------------------------------------------
    // Animation role resolution
    // -----------------------------------------------------------------------

    #[test]
    fn animation_roles_resolve_by_suffix() {
        let clips = vec![
            clip("Human Armature|Run"),
            clip("Human Armature|Walk"),
            clip("Human Armature|Idle"),
        ];
        let set = AnimationSet::resolve(clips);
        assert_eq!(set.clip_index_for(AnimationRole::Run), Some(0));
        assert_eq!(set.clip_index_for(AnimationRole::Walk), Some(1));
        assert_eq!(set.clip_index_for(AnimationRole::Idle), Some(2));
    }

    #[test]
    fn unmapped_roles_fall_back_to_the_first_clip() {
        let set = AnimationSet::resolve(vec![clip("Flail")]);
        assert_eq!(set.clip_index_for(AnimationRole::Run), Some(0));
        assert_eq!(set.clip_index_for(AnimationRole::Idle), Some(0));

        let empty = AnimationSet::resolve(Vec::new());
        assert_eq!(empty.clip_index_for(AnimationRole::Run), None);
    }

    fn clip(name: &str) -> nightwood::assets::AnimationClip {
        nightwood::assets::AnimationClip {
            name: name.to_string(),
            duration: 1.0,
        }
    }
}
