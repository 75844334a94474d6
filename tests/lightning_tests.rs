//! Lightning sequencer and radar notification tests

#[cfg(test)]
mod tests {
    use nightwood::lightning::{LightningManager, RadarSink};
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingRadar {
        flashes: Vec<(f32, usize)>,
        ends: Vec<f32>,
        clock: f32,
    }

    impl RadarSink for RecordingRadar {
        fn on_lightning_flash(&mut self, positions: &HashMap<u32, (f32, f32)>) {
            self.flashes.push((self.clock, positions.len()));
        }
        fn on_lightning_end(&mut self) {
            self.ends.push(self.clock);
        }
    }

    fn run_for(
        manager: &mut LightningManager,
        radar: &mut RecordingRadar,
        seconds: f32,
        positions: &HashMap<u32, (f32, f32)>,
    ) -> f32 {
        let dt = 0.01;
        let mut max_intensity = 0.0f32;
        let steps = (seconds / dt) as usize;
        for _ in 0..steps {
            radar.clock += dt;
            manager.update(dt, positions, radar);
            max_intensity = max_intensity.max(manager.light_intensity);
        }
        max_intensity
    }

    #[test]
    fn every_sequence_pings_the_radar_exactly_once() {
        let mut manager = LightningManager::new();
        let mut radar = RecordingRadar::default();
        let mut positions = HashMap::new();
        positions.insert(3, (10.0, 20.0));
        positions.insert(4, (-5.0, 7.0));

        run_for(&mut manager, &mut radar, 120.0, &positions);

        // Gaps are 5..12 s, so two minutes produce several sequences.
        assert!(radar.ends.len() >= 5);
        // One reveal per completed sequence, never more.
        assert!(radar.flashes.len() >= radar.ends.len());
        assert!(radar.flashes.len() <= radar.ends.len() + 1);
        assert!(radar.flashes.iter().all(|(_, count)| *count == 2));
    }

    #[test]
    fn flashes_are_spaced_by_the_configured_gap() {
        let mut manager = LightningManager::new();
        let mut radar = RecordingRadar::default();
        let positions = HashMap::new();

        run_for(&mut manager, &mut radar, 200.0, &positions);
        assert!(radar.ends.len() >= 10);

        // The next sequence begins at least the minimum gap after the
        // previous one ended.
        for (end, next_flash) in radar
            .ends
            .iter()
            .zip(radar.flashes.iter().skip(1).map(|(t, _)| t))
        {
            let gap = next_flash - end;
            assert!(gap >= 4.9, "sequence started after only {gap:.2}s");
            assert!(gap <= 12.5, "sequence took {gap:.2}s to start");
        }
    }

    #[test]
    fn light_goes_dark_between_sequences() {
        let mut manager = LightningManager::new();
        let mut radar = RecordingRadar::default();
        let positions = HashMap::new();

        let max_intensity = run_for(&mut manager, &mut radar, 60.0, &positions);
        assert!(max_intensity > 0.0, "no pulse ever lit up");
        // Stroke intensities are capped at 4.5.
        assert!(max_intensity <= 4.5);

        // Whenever no sequence is active the light must be off.
        if !manager.is_active() {
            assert_eq!(manager.light_intensity, 0.0);
        }
    }
}
