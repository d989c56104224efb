pub mod authority;
pub mod config;
pub mod error;

pub use authority::{
    AuthorityFamily, AuthorityWriteMode, AuthorityWriter, PlainAuthorityWriter, XAuthority,
};
pub use config::{ConfigError, ConfigStore, LightDmSection, SupervisorConfig, load_config};
pub use error::SupervisorError;
