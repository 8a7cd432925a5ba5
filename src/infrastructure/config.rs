use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub influx: InfluxSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub url: String,
    pub org: String,
    pub token: String,
    pub bucket: String,
    pub measurement: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

pub fn load_store_config() -> anyhow::Result<StoreConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/influx"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
