//! Loading [`OutputConfig`] from an INI section.
//!
//! ```ini
//! [dingtalk]
//! url = https://oapi.dingtalk.com/robot/send
//! api_access_token = 0123abcd
//! response_header_timeout = 3000
//! at.at_mobiles = 13800000000, 13900000000
//! ```
//!
//! Keys absent from the section keep their defaults. Unknown keys are
//! ignored with a warning.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use ::ini::Ini;
use encoding_rs::Encoding;
use log::warn;

use super::OutputConfig;
use crate::error::ConfigError;

const DEFAULT_ENCODING: &str = "utf-8";

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn apply_key(config: &mut OutputConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "url" => config.url = value.trim().to_owned(),
        "api_access_token" => config.api_access_token = value.trim().to_owned(),
        "max_retries" => config.max_retries = parse_num(key, value)?,
        "compression" => config.compression = parse_bool(key, value)?,
        "keep_alive" => config.keep_alive = parse_bool(key, value)?,
        "max_idle_conns" => config.max_idle_conns = parse_num(key, value)?,
        "idle_conn_timeout" => config.idle_conn_timeout = parse_num(key, value)?,
        "response_header_timeout" => config.response_header_timeout = parse_num(key, value)?,
        "connect_timeout" => config.connect_timeout = parse_num(key, value)?,
        "send_msg_type" => config.send_msg_type = value.parse()?,
        "at.at_mobiles" => config.at.mobiles = parse_list(value),
        "at.at_user_ids" => config.at.user_ids = parse_list(value),
        "at.is_at_all" => config.at.all = parse_bool(key, value)?,
        "workers" => config.workers = parse_num(key, value)?,
        "queue_capacity" => config.queue_capacity = parse_num(key, value)?,
        other => warn!("OutputConfig: ignoring unknown key {other:?}"),
    }
    Ok(())
}

fn decode(path: &Path, bytes: &[u8], label: &str) -> Result<String, ConfigError> {
    let encoding = Encoding::for_label(label.trim().to_ascii_lowercase().as_bytes())
        .ok_or_else(|| ConfigError::UnknownEncoding(label.to_owned()))?;
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ConfigError::Decode {
            path: path.display().to_string(),
            encoding: encoding.name().to_owned(),
        });
    }
    Ok(text.into_owned())
}

impl OutputConfig {
    /// Parse `section` of an INI document and validate the result.
    pub fn from_ini_str(text: &str, section: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        let props = ini
            .section(Some(section))
            .ok_or_else(|| ConfigError::MissingSection(section.to_owned()))?;
        let mut config = Self::default();
        for (key, value) in props.iter() {
            apply_key(&mut config, key.trim(), value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Read, decode, and parse an INI file.
    ///
    /// `encoding` is a WHATWG label such as `utf-8` or `gbk`; UTF-8 is
    /// assumed when omitted.
    pub fn from_ini_file(
        path: impl AsRef<Path>,
        section: &str,
        encoding: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source: ErrorKind::UnexpectedEof.into(),
            });
        }
        let text = decode(path, &bytes, encoding.unwrap_or(DEFAULT_ENCODING))?;
        Self::from_ini_str(&text, section)
    }
}
