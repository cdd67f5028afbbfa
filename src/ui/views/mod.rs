mod recorder_view;

pub use recorder_view::{format_elapsed, RecorderView};
