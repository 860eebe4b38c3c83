// Dataset input: labeled test cases and unlabeled prediction inputs

mod loader;

pub use loader::{load_dataset, load_inputs};
