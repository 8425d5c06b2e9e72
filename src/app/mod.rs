mod state;

pub use state::{App, DirEntry, InputMode, OverlayData};
