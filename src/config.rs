//! Engine settings.
//!
//! Every setting has a name and can be read or written as text through `EngineConfig::set` and
//! `EngineConfig::get`. `EngineConfig::from_env` applies `ANYQL_<NAME>` variables over the
//! defaults, e.g. `ANYQL_CHUNK_SIZE=64`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown setting {0}.")]
    UnknownSetting(String),
    #[error("Invalid value {value:?} for setting {name}: {reason}.")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    NestedLoop,
    SortMerge,
}

impl FromStr for JoinStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nested_loop" | "nestedloop" => Ok(JoinStrategy::NestedLoop),
            "sort_merge" | "sortmerge" => Ok(JoinStrategy::SortMerge),
            x => Err(format!("expected nested_loop or sort_merge, got {}", x)),
        }
    }
}

impl std::fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinStrategy::NestedLoop => f.write_str("nested_loop"),
            JoinStrategy::SortMerge => f.write_str("sort_merge"),
        }
    }
}

pub const DEFAULT_CHUNK_SIZE: usize = 256;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;
pub const DEFAULT_CACHE_CAPACITY: usize = 128;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rows per chunk sent from a row source's producer thread.
    pub chunk_size: usize,
    /// Chunks buffered between a producer and the consumer.
    pub channel_capacity: usize,
    pub join_strategy: JoinStrategy,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Hand source-local WHERE fragments to sources.
    pub pushdown: bool,
    /// When set, every compiled artifact is written to this directory.
    pub store_artifacts: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            join_strategy: JoinStrategy::NestedLoop,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            pushdown: true,
            store_artifacts: None,
        }
    }
}

impl EngineConfig {
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let funcs = SETTINGS
            .get(name)
            .ok_or_else(|| Error::UnknownSetting(name.to_string()))?;
        (funcs.set)(value, self)
    }

    pub fn get(&self, name: &str) -> Result<String> {
        let funcs = SETTINGS
            .get(name)
            .ok_or_else(|| Error::UnknownSetting(name.to_string()))?;
        Ok((funcs.get)(self))
    }

    /// Names of every setting, sorted.
    pub fn setting_names() -> Vec<&'static str> {
        let mut names: Vec<_> = SETTINGS.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Apply `ANYQL_*` variables from `vars` over the defaults. Other variables are ignored.
    pub fn from_vars<I: IntoIterator<Item = (String, String)>>(vars: I) -> Result<Self> {
        let mut conf = EngineConfig::default();
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix("ANYQL_") {
                conf.set(&name.to_lowercase(), &value)?;
            }
        }
        Ok(conf)
    }
}

struct SettingFunctions {
    set: fn(value: &str, conf: &mut EngineConfig) -> Result<()>,
    get: fn(conf: &EngineConfig) -> String,
}

fn insert_setting<S: EngineSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    map.insert(
        S::NAME,
        SettingFunctions {
            set: S::set_from_str,
            get: S::get_as_string,
        },
    );
}

lazy_static::lazy_static! {
    static ref SETTINGS: HashMap<&'static str, SettingFunctions> = {
        let mut map = HashMap::new();
        insert_setting::<ChunkSize>(&mut map);
        insert_setting::<ChannelCapacity>(&mut map);
        insert_setting::<JoinStrategySetting>(&mut map);
        insert_setting::<CacheCapacity>(&mut map);
        insert_setting::<CacheTtl>(&mut map);
        insert_setting::<Pushdown>(&mut map);
        insert_setting::<StoreArtifacts>(&mut map);
        map
    };
}

pub trait EngineSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_str(value: &str, conf: &mut EngineConfig) -> Result<()>;
    fn get_as_string(conf: &EngineConfig) -> String;
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| Error::InvalidValue {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn positive(name: &'static str, value: &str) -> Result<usize> {
    match parse::<usize>(name, value)? {
        0 => Err(Error::InvalidValue {
            name,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}

pub struct ChunkSize;

impl EngineSetting for ChunkSize {
    const NAME: &'static str = "chunk_size";
    const DESCRIPTION: &'static str = "Rows per chunk sent by a row source";

    fn set_from_str(value: &str, conf: &mut EngineConfig) -> Result<()> {
        conf.chunk_size = positive(Self::NAME, value)?;
        Ok(())
    }

    fn get_as_string(conf: &EngineConfig) -> String {
        conf.chunk_size.to_string()
    }
}

pub struct ChannelCapacity;

impl EngineSetting for ChannelCapacity {
    const NAME: &'static str = "channel_capacity";
    const DESCRIPTION: &'static str = "Chunks buffered between a row source and the engine";

    fn set_from_str(value: &str, conf: &mut EngineConfig) -> Result<()> {
        conf.channel_capacity = positive(Self::NAME, value)?;
        Ok(())
    }

    fn get_as_string(conf: &EngineConfig) -> String {
        conf.channel_capacity.to_string()
    }
}

pub struct JoinStrategySetting;

impl EngineSetting for JoinStrategySetting {
    const NAME: &'static str = "join_strategy";
    const DESCRIPTION: &'static str = "nested_loop or sort_merge";

    fn set_from_str(value: &str, conf: &mut EngineConfig) -> Result<()> {
        conf.join_strategy = parse(Self::NAME, value)?;
        Ok(())
    }

    fn get_as_string(conf: &EngineConfig) -> String {
        conf.join_strategy.to_string()
    }
}

pub struct CacheCapacity;

impl EngineSetting for CacheCapacity {
    const NAME: &'static str = "cache_capacity";
    const DESCRIPTION: &'static str = "Compiled artifacts kept in the cache";

    fn set_from_str(value: &str, conf: &mut EngineConfig) -> Result<()> {
        conf.cache_capacity = positive(Self::NAME, value)?;
        Ok(())
    }

    fn get_as_string(conf: &EngineConfig) -> String {
        conf.cache_capacity.to_string()
    }
}

pub struct CacheTtl;

impl EngineSetting for CacheTtl {
    const NAME: &'static str = "cache_ttl";
    const DESCRIPTION: &'static str = "Seconds a compiled artifact stays valid";

    fn set_from_str(value: &str, conf: &mut EngineConfig) -> Result<()> {
        conf.cache_ttl = Duration::from_secs(parse(Self::NAME, value)?);
        Ok(())
    }

    fn get_as_string(conf: &EngineConfig) -> String {
        conf.cache_ttl.as_secs().to_string()
    }
}

pub struct Pushdown;

impl EngineSetting for Pushdown {
    const NAME: &'static str = "pushdown";
    const DESCRIPTION: &'static str = "Hand source-local filters to sources";

    fn set_from_str(value: &str, conf: &mut EngineConfig) -> Result<()> {
        conf.pushdown = parse(Self::NAME, value)?;
        Ok(())
    }

    fn get_as_string(conf: &EngineConfig) -> String {
        conf.pushdown.to_string()
    }
}

pub struct StoreArtifacts;

impl EngineSetting for StoreArtifacts {
    const NAME: &'static str = "store_artifacts";
    const DESCRIPTION: &'static str = "Directory compiled artifacts are written to; empty disables";

    fn set_from_str(value: &str, conf: &mut EngineConfig) -> Result<()> {
        conf.store_artifacts = match value.trim() {
            "" => None,
            dir => Some(PathBuf::from(dir)),
        };
        Ok(())
    }

    fn get_as_string(conf: &EngineConfig) -> String {
        conf.store_artifacts
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

#[test]
fn test_set_and_get_by_name() {
    let mut conf = EngineConfig::default();
    let cases = vec![
        ("chunk_size", "16"),
        ("channel_capacity", "2"),
        ("join_strategy", "sort_merge"),
        ("cache_capacity", "8"),
        ("cache_ttl", "30"),
        ("pushdown", "false"),
        ("store_artifacts", "/tmp/plans"),
    ];
    for (name, value) in cases {
        println!("Running case: {}", name);
        conf.set(name, value).unwrap();
        assert_eq!(conf.get(name).unwrap(), value);
    }
    assert_eq!(conf.join_strategy, JoinStrategy::SortMerge);
    assert_eq!(conf.cache_ttl, Duration::from_secs(30));
    assert_eq!(EngineConfig::setting_names().len(), 7);
}

#[test]
fn test_rejects_bad_settings() {
    let mut conf = EngineConfig::default();
    assert_eq!(
        conf.set("batch_size", "1"),
        Err(Error::UnknownSetting("batch_size".to_string()))
    );
    assert!(matches!(
        conf.set("chunk_size", "0"),
        Err(Error::InvalidValue { name: "chunk_size", .. })
    ));
    assert!(conf.set("pushdown", "maybe").is_err());
    assert_eq!(conf, EngineConfig::default());
}

#[test]
fn test_from_vars_reads_prefixed_names() {
    let vars = vec![
        ("ANYQL_CHUNK_SIZE".to_string(), "64".to_string()),
        ("PATH".to_string(), "/bin".to_string()),
    ];
    let conf = EngineConfig::from_vars(vars).unwrap();
    assert_eq!(conf.chunk_size, 64);
    assert_eq!(conf.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
}
