//! Progress bars for block transfers

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rkflasher_core::transfer::TransferProgress;

/// Create a progress bar labelled with the transfer name
fn create_progress_bar(total: u64, label: &str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {{msg}}",
                label
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Create a spinner for transfers of unknown length
fn create_spinner(label: &str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template(&format!(
        "{{spinner:.green}} {} {{bytes}} {{msg}}",
        label
    ))?);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Progress reporter using indicatif progress bars
///
/// Bars are drawn on stderr, stdout carries payload data.
#[derive(Default)]
pub struct IndicatifProgress {
    current_bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransferProgress for IndicatifProgress {
    fn start(&mut self, label: &str, total_bytes: u64) {
        let pb = if total_bytes == 0 {
            create_spinner(label).unwrap_or_else(|_| ProgressBar::new_spinner())
        } else {
            create_progress_bar(total_bytes, label)
                .unwrap_or_else(|_| ProgressBar::new(total_bytes))
        };
        self.current_bar = Some(pb);
    }

    fn window(&mut self, offset: u32, bytes_done: u64) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(bytes_done);
            pb.set_message(format!("@ 0x{:08x}", offset));
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_and_clear();
        }
    }
}
