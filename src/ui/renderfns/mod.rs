pub mod header;
pub mod utils;

pub use header::draw_header;
pub use utils::{active_color, active_label, format_date, truncate};
