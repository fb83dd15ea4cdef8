// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use prism_render_vk::{VkOptions, DEFAULT_CLEAR_COLOR};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: String::from("prism"),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: DEFAULT_CLEAR_COLOR,
            vertex_shader: None,
            fragment_shader: None,
        }
    }
}

impl RenderCfg {
    pub fn vk_options(&self) -> VkOptions {
        VkOptions {
            vertex_shader: self.vertex_shader.clone(),
            fragment_shader: self.fragment_shader.clone(),
            clear_color: self.clear_color,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogCfg {
    pub filter: String,
}

impl Default for LogCfg {
    fn default() -> Self {
        LogCfg {
            filter: String::from("info"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub log: LogCfg,
}

/// Reads `path`. A missing file yields defaults; so does a malformed one,
/// with a warning.
///
/// Runs before the subscriber is installed, so messages are returned rather
/// than logged.
pub fn load(path: &Path) -> (AppCfg, Option<String>) {
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<AppCfg>(&s) {
            Ok(cfg) => (cfg, None),
            Err(e) => (
                AppCfg::default(),
                Some(format!("ignoring malformed {}: {e}", path.display())),
            ),
        },
        Err(e) if e.kind() == ErrorKind::NotFound => (AppCfg::default(), None),
        Err(e) => (
            AppCfg::default(),
            Some(format!("cannot read {}: {e}", path.display())),
        ),
    }
}

/// Logs the outcome of `load` once tracing is up.
pub fn report(path: &Path, problem: Option<String>) {
    match problem {
        Some(msg) => warn!("{msg}; using defaults"),
        None => info!("config: {}", path.display()),
    }
}
