//! config-rs/lib.rs
//! Shared configuration utilities for consistent service configuration
//! Provides standardized port/address resolution and typed env lookups

use std::env;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::str::FromStr;

/// Configuration handle for a named service.
///
/// The service name is uppercased (dashes become underscores) to form the
/// environment-variable prefix, e.g. `promql` -> `PROMQL_SERVICE_PORT`.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    service_name: String,
}

impl ServiceConfig {
    pub fn new(service_name: &str) -> Self {
        // Pick up .env before any lookup; a second load is a no-op and
        // existing process env always wins.
        dotenv::dotenv().ok();
        Self {
            service_name: service_name.to_string(),
        }
    }

    fn env_prefix(&self) -> String {
        self.service_name.to_uppercase().replace('-', "_")
    }

    /// Get the service port from `{NAME}_SERVICE_PORT` with proper fallback
    ///
    /// # Arguments
    /// * `default_port` - The default port to use if not specified in environment
    ///
    /// # Returns
    /// The port number to use for the service
    pub fn get_service_port(&self, default_port: u16) -> u16 {
        let var_name = format!("{}_SERVICE_PORT", self.env_prefix());
        env::var(&var_name)
            .unwrap_or_else(|_| default_port.to_string())
            .parse::<u16>()
            .unwrap_or_else(|_| {
                log::warn!("Invalid port in {}, using default {}", var_name, default_port);
                default_port
            })
    }

    /// Create a SocketAddr for binding the service
    ///
    /// `{NAME}_SERVICE_ADDR` overrides the full address (plain `host:port` or
    /// `http://host:port`); otherwise the service binds `0.0.0.0:{port}`.
    pub fn get_bind_address(&self, port: u16) -> SocketAddr {
        let var_name = format!("{}_SERVICE_ADDR", self.env_prefix());

        if let Ok(addr_str) = env::var(&var_name) {
            let candidate = addr_str
                .strip_prefix("http://")
                .or_else(|| addr_str.strip_prefix("https://"))
                .unwrap_or(&addr_str);
            if let Ok(addr) = candidate.parse::<SocketAddr>() {
                return addr;
            }
            log::warn!("Invalid address format in {}, using default", var_name);
        }

        format!("0.0.0.0:{}", port)
            .parse()
            .expect("static bind address is always valid")
    }
}

/// Read an environment variable with a string default.
pub fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, falling back to a default value
/// when the variable is unset or fails to parse.
pub fn env_parse<T: FromStr + Debug>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid value in {}, using default {:?}", name, default);
            default
        }),
        Err(_) => default,
    }
}
