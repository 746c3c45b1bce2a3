pub mod audit;
pub mod config;
pub mod diary;
pub mod document;
pub mod entity_note;
pub mod feed;
pub mod frontmatter;
pub mod lock;
pub mod normalize;
pub mod paths;
pub mod reconcile;
pub mod render;
pub mod state;
pub mod store;
pub mod util;
pub mod warn;
