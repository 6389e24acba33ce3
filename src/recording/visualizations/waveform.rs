//! Scrolling level history shown as a sparkline.

/// Appends a level reading, dropping the oldest once `max_width` is exceeded.
pub fn update_waveform(history: &mut Vec<u64>, level: u8, max_width: usize) {
    history.push(level as u64);
    if history.len() > max_width {
        let excess = history.len() - max_width;
        history.drain(..excess);
    }
}

/// Fits the history to a new terminal width, padding with silence on the left.
pub fn resize_waveform(history: &mut Vec<u64>, target_width: usize) {
    if history.len() > target_width {
        let excess = history.len() - target_width;
        history.drain(..excess);
    } else if history.len() < target_width {
        let missing = target_width - history.len();
        history.splice(0..0, std::iter::repeat(0).take(missing));
    }
}
