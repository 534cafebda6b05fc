pub mod credentials;
pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, read_config};
pub use schema::{
    Config, ConversationConfig, DatabaseConfig, GatewayConfig, GeminiConfig, SweepConfig,
    TelegramConfig, TwilioConfig,
};
