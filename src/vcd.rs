mod reader;
pub use reader::*;

mod types;
pub use types::*;

mod parse;
pub use parse::*;

mod signal;
pub use signal::*;

mod signal_map;
pub use signal_map::*;

mod utilities;
