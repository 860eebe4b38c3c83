// Golden prompt persistence

mod store;

pub use store::{find_latest_golden_prompt, load_golden_prompt, PromptStore, RunMetadata, SavedPrompt};
