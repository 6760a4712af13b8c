use dotenv::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub completion_api_key: String,
    pub completion_model: String,
    pub completion_base_url: String,
    pub completion_timeout_secs: u64,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            completion_api_key: env::var("COMPLETION_API_KEY")
                .expect("COMPLETION_API_KEY must be set"),
            completion_model: env::var("COMPLETION_MODEL")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
            completion_base_url: env::var("COMPLETION_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            completion_timeout_secs: env::var("COMPLETION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("COMPLETION_TIMEOUT_SECS must be a number of seconds"),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("SERVER_PORT must be a valid port number"),
        }
    }
}
