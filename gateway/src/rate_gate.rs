use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Spaces dispatches into waves of `batch_size`.
///
/// Every wave starts at least `interval` after the previous one, so any
/// `batch_size + 1` consecutive admissions span at least `interval`. Inside a
/// wave admissions are immediate.
#[derive(Debug)]
pub struct RateGate {
    batch_size: usize,
    interval: Duration,
    admitted_in_wave: usize,
    wave_start: Option<Instant>,
}

impl RateGate {
    pub fn new(batch_size: usize, interval: Duration) -> Self {
        RateGate {
            batch_size: batch_size.max(1),
            interval,
            admitted_in_wave: 0,
            wave_start: None,
        }
    }

    /// Waits until one more dispatch may start.
    pub async fn admit(&mut self) {
        match self.wave_start {
            None => self.wave_start = Some(Instant::now()),
            Some(start) if self.admitted_in_wave >= self.batch_size => {
                sleep_until(start + self.interval).await;
                self.wave_start = Some(Instant::now());
                self.admitted_in_wave = 0;
            }
            Some(_) => {}
        }
        self.admitted_in_wave += 1;
    }
}
