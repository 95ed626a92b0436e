pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    banner, dim, error, header, info, muted, phase, property, section, status, success,
    summary_row, timing, uri, warn,
};
pub use progress::{ImportProgress, Spinner};
pub use table::{SourceRow, TableBuilder, sources_table, stats_table};
pub use theme::{Theme, theme};
