mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Cache, Config, Search, Service, Upstream};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}

	let base_url = cfg.upstream.base_url.as_str();

	if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
		return Err(Error::Validation {
			message: "upstream.base_url must start with http:// or https://.".to_string(),
		});
	}
	if cfg.upstream.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "upstream.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.upstream.page_limit == 0 {
		return Err(Error::Validation {
			message: "upstream.page_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.tag_limit == 0 {
		return Err(Error::Validation {
			message: "search.tag_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.local_page_size == 0 {
		return Err(Error::Validation {
			message: "search.local_page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_empty_pages == 0 {
		return Err(Error::Validation {
			message: "search.max_empty_pages must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.ttl_secs == 0 {
		return Err(Error::Validation {
			message: "cache.ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.max_entries == 0 {
		return Err(Error::Validation {
			message: "cache.max_entries must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let trimmed = cfg.upstream.base_url.trim().trim_end_matches('/');

	if trimmed.len() != cfg.upstream.base_url.len() {
		cfg.upstream.base_url = trimmed.to_string();
	}

	cfg.service.http_bind = cfg.service.http_bind.trim().to_string();
}
