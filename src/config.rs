use std::env;
use std::path::PathBuf;

use anyhow::Context;

use crate::models::LabelPolicy;
use crate::query::BaseFilter;

pub const DEFAULT_TENANT_ID: &str = "5abb7996ed015bbcae98a112";
pub const DEFAULT_FROM: &str = "2018-04-02T00:00:00.599700+03:00";
pub const DEFAULT_TO: &str = "2018-06-06T00:00:00.599700+03:00";
pub const DEFAULT_OUTPUT_DIR: &str = "results";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub tenant_id: String,
    pub from: String,
    pub to: String,
    pub output_dir: PathBuf,
    pub locale: Option<String>,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to the statement store's Postgres instance")?;
        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS is not a number: {value}"))?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            max_connections,
            tenant_id: var_or("LRS_TENANT_ID", DEFAULT_TENANT_ID),
            from: var_or("REPORT_FROM", DEFAULT_FROM),
            to: var_or("REPORT_TO", DEFAULT_TO),
            output_dir: PathBuf::from(var_or("REPORT_OUTPUT_DIR", DEFAULT_OUTPUT_DIR)),
            locale: env::var("REPORT_LOCALE").ok().filter(|value| !value.is_empty()),
        })
    }

    pub fn base_filter(&self) -> BaseFilter {
        BaseFilter {
            tenant_id: self.tenant_id.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }

    pub fn labels(&self) -> LabelPolicy {
        LabelPolicy::new(self.locale.clone())
    }
}
