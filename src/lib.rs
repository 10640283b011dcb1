pub mod analysis_parser;
pub mod api_cache;
pub mod api_football;
pub mod billing;
pub mod config;
pub mod export;
pub mod fbref_parse;
pub mod footystats;
pub mod http_client;
pub mod justifications;
pub mod llm;
pub mod logging;
pub mod mailer;
pub mod odds_input;
pub mod opportunities;
pub mod pipeline;
pub mod probability;
pub mod prompt;
pub mod scraper_fetch;
pub mod state;
pub mod team_stats;
pub mod users;
pub mod worker;
