//! Directory reload: YAML fixtures, structured record binding, and the
//! modification-time cache.

mod common;

use foreman::config;
use foreman::{CodecError, ConfigValue};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Log appender flavor, as written in `log.yml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum AppenderKind {
    FileLogAppender,
    StdoutLogAppender,
}

fn default_level() -> String {
    "DEBUG".to_string()
}

/// One appender entry beneath a logger definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogAppenderDefine {
    #[serde(rename = "type")]
    kind: AppenderKind,
    #[serde(default = "default_level")]
    level: String,
    #[serde(default)]
    formatter: String,
    #[serde(default)]
    file: String,
}

/// A logger definition, bound from the `logs` sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogDefine {
    name: String,
    #[serde(default = "default_level")]
    level: String,
    #[serde(default)]
    formatter: String,
    #[serde(default)]
    appenders: Vec<LogAppenderDefine>,
}

impl ConfigValue for LogDefine {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        Ok(serde_yaml::from_str(text)?)
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        Ok(serde_yaml::to_string(self)?.trim_end().to_string())
    }
}

/// A server definition, bound from the `servers` sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ServerDefine {
    address: Vec<String>,
    #[serde(default)]
    keepalive: i32,
    #[serde(default = "default_timeout")]
    timeout: i32,
    name: String,
    accept_worker: String,
    io_worker: String,
    process_worker: String,
    #[serde(rename = "type")]
    kind: String,
}

fn default_timeout() -> i32 {
    1000
}

impl ConfigValue for ServerDefine {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        Ok(serde_yaml::from_str(text)?)
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        Ok(serde_yaml::to_string(self)?.trim_end().to_string())
    }
}

#[test]
fn record_codec_round_trip() {
    common::init_test_logging();

    let log = LogDefine {
        name: "root".to_string(),
        level: "INFO".to_string(),
        formatter: String::new(),
        appenders: vec![
            LogAppenderDefine {
                kind: AppenderKind::FileLogAppender,
                level: "DEBUG".to_string(),
                formatter: String::new(),
                file: "/var/log/foreman/root.log".to_string(),
            },
            LogAppenderDefine {
                kind: AppenderKind::StdoutLogAppender,
                level: "DEBUG".to_string(),
                formatter: String::new(),
                file: String::new(),
            },
        ],
    };

    let text = log.to_yaml_string().unwrap();
    assert_eq!(LogDefine::from_yaml_str(&text).unwrap(), log);

    // A definition without the required name must fail to parse.
    assert!(LogDefine::from_yaml_str("level: INFO\n").is_err());
}

#[test]
fn load_and_reload_conf_dir() {
    common::init_test_logging();

    let io_threads = config::get_or_create("workers.io.thread_num", 0i32, "").unwrap();
    let http_io_threads = config::get_or_create("workers.http_io.thread_num", 0i32, "").unwrap();
    let accept_threads = config::get_or_create("workers.accept.thread_num", 0i32, "").unwrap();
    let worker_threads = config::get_or_create("workers.worker.thread_num", 0i32, "").unwrap();
    let notify_threads = config::get_or_create("workers.notify.thread_num", 0i32, "").unwrap();
    let service_io_threads =
        config::get_or_create("workers.service_io.thread_num", 0i32, "").unwrap();

    let flush_interval = config::get_or_create("metrics.flush_interval", 0i64, "").unwrap();

    let servers_config = config::get_or_create(
        "servers",
        Vec::<ServerDefine>::new(),
        "server definitions",
    )
    .unwrap();
    let logs_config =
        config::get_or_create("logs", Vec::<LogDefine>::new(), "logger definitions").unwrap();

    config::load_from_conf_dir("tests/fixtures/config", false);

    // worker.yml: plain scalars behind nested maps.
    assert_eq!(io_threads.value(), 8);
    assert_eq!(http_io_threads.value(), 1);
    assert_eq!(accept_threads.value(), 2);
    assert_eq!(worker_threads.value(), 8);
    assert_eq!(notify_threads.value(), 8);
    assert_eq!(service_io_threads.value(), 4);

    // nested/metrics.yml: the scan descends subdirectories.
    assert_eq!(flush_interval.value(), 250);

    // server.yml: a sequence of records bound whole.
    let servers = servers_config.value();
    assert_eq!(servers.len(), 2);
    assert_eq!(
        servers[0].address,
        vec![
            "0.0.0.0:8090".to_string(),
            "127.0.0.1:8091".to_string(),
            "/tmp/test.sock".to_string()
        ]
    );
    assert_eq!(servers[0].keepalive, 1);
    assert_eq!(servers[0].timeout, 1000);
    assert_eq!(servers[0].name, "gateway/1.1");
    assert_eq!(servers[0].accept_worker, "accept");
    assert_eq!(servers[0].io_worker, "http_io");
    assert_eq!(servers[0].process_worker, "http_io");
    assert_eq!(servers[0].kind, "http");
    assert_eq!(servers[1].address.len(), 2);
    assert_eq!(servers[1].keepalive, 0); // absent in the file, default applies
    assert_eq!(servers[1].name, "gateway-rpc/1.0");
    assert_eq!(servers[1].kind, "rpc");

    // log.yml: records with an enum-tagged nested sequence.
    let logs = logs_config.value();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].name, "root");
    assert_eq!(logs[0].level, "INFO");
    assert_eq!(logs[0].appenders.len(), 2);
    assert_eq!(logs[0].appenders[0].kind, AppenderKind::FileLogAppender);
    assert_eq!(logs[0].appenders[0].file, "/var/log/foreman/root.log");
    assert_eq!(logs[0].appenders[1].kind, AppenderKind::StdoutLogAppender);
    assert_eq!(logs[1].name, "system");

    // Mutate in memory, then reload without force: the files are unchanged,
    // so the cache skips them and the mutation survives.
    io_threads.set_value(1);
    http_io_threads.set_value(2);
    accept_threads.set_value(3);

    config::load_from_conf_dir("tests/fixtures/config", false);
    assert_eq!(io_threads.value(), 1);
    assert_eq!(http_io_threads.value(), 2);
    assert_eq!(accept_threads.value(), 3);

    // A forced reload bypasses the cache and restores the file values.
    config::load_from_conf_dir("tests/fixtures/config", true);
    assert_eq!(io_threads.value(), 8);
    assert_eq!(http_io_threads.value(), 1);
    assert_eq!(accept_threads.value(), 2);
}

#[test]
fn broken_file_is_skipped_and_not_retried() {
    common::init_test_logging();

    let target = foreman::util::project_root().join("target");
    let dir = tempfile::Builder::new()
        .prefix("conf-broken-")
        .tempdir_in(&target)
        .expect("create temp config dir");
    let relative = dir
        .path()
        .strip_prefix(foreman::util::project_root())
        .unwrap()
        .to_path_buf();

    let good = config::get_or_create("brokentest.good", 0i32, "").unwrap();

    {
        let mut file = std::fs::File::create(dir.path().join("good.yml")).unwrap();
        writeln!(file, "brokentest:\n  good: 5").unwrap();
    }
    {
        let mut file = std::fs::File::create(dir.path().join("broken.yml")).unwrap();
        writeln!(file, "brokentest: [unclosed").unwrap();
    }

    // The broken file is logged and skipped; the good file still loads.
    config::load_from_conf_dir(&relative, false);
    assert_eq!(good.value(), 5);

    // The cache was stamped before parsing, so the untouched broken file is
    // not retried; the good file is skipped as unchanged.
    good.set_value(9);
    config::load_from_conf_dir(&relative, false);
    assert_eq!(good.value(), 9);

    // Force reload re-reads everything.
    config::load_from_conf_dir(&relative, true);
    assert_eq!(good.value(), 5);
}
