pub mod edit;
pub mod import;
pub mod inspect;
pub mod replay;
