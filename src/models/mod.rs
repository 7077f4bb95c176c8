pub mod content;
pub mod history;

pub use content::*;
pub use history::*;
