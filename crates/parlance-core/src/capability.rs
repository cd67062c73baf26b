//! Terminal capability negotiation.
//!
//! Capabilities are probed once at startup. A failed probe never aborts:
//! [`negotiate`] falls back to [`TerminalCapabilities::conservative`].

use std::collections::HashMap;
use std::io::IsTerminal;

/// Image protocol the terminal understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageProtocol {
    /// Kitty graphics protocol (also spoken by Ghostty and WezTerm).
    Kitty,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalCapabilities {
    pub true_color: bool,
    pub image_protocol: ImageProtocol,
    pub supports_osc8: bool,
}

impl TerminalCapabilities {
    /// No images, 256 colors, degraded links.
    pub const fn conservative() -> Self {
        Self {
            true_color: false,
            image_protocol: ImageProtocol::None,
            supports_osc8: false,
        }
    }

    /// Applies user overrides on top of probed values.
    ///
    /// `osc8: None` keeps the probed value; `images: false` disables any
    /// image protocol.
    #[must_use]
    pub fn with_overrides(mut self, osc8: Option<bool>, images: bool) -> Self {
        if let Some(osc8) = osc8 {
            self.supports_osc8 = osc8;
        }
        if !images {
            self.image_protocol = ImageProtocol::None;
        }
        self
    }
}

impl Default for TerminalCapabilities {
    fn default() -> Self {
        Self::conservative()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("stdout is not a terminal")]
    NotATerminal,
}

/// Source of terminal capabilities.
pub trait CapabilityProbe {
    fn probe(&self) -> Result<TerminalCapabilities, ProbeError>;
}

const PROBED_VARS: &[&str] = &[
    "COLORTERM",
    "KITTY_WINDOW_ID",
    "TERM",
    "TERM_PROGRAM",
    "VTE_VERSION",
    "WT_SESSION",
];

/// Probe that reads well-known environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvProbe {
    vars: HashMap<String, String>,
    is_tty: bool,
}

impl EnvProbe {
    /// Snapshot of the current process environment.
    pub fn from_env() -> Self {
        let vars = PROBED_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| ((*name).to_string(), v)))
            .collect();
        Self {
            vars,
            is_tty: std::io::stdout().is_terminal(),
        }
    }

    /// Probe over explicit variables, for tests and headless runs.
    pub fn from_vars<I, K, V>(vars: I, is_tty: bool) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            is_tty,
        }
    }

    fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    fn true_color(&self) -> bool {
        self.var("COLORTERM")
            .is_some_and(|v| v.eq_ignore_ascii_case("truecolor") || v.eq_ignore_ascii_case("24bit"))
    }

    fn is_kitty_like(&self) -> bool {
        self.var("KITTY_WINDOW_ID").is_some()
            || self.var("TERM").is_some_and(|t| t.contains("kitty"))
            || matches!(self.var("TERM_PROGRAM"), Some("kitty" | "ghostty" | "WezTerm"))
    }

    fn supports_osc8(&self) -> bool {
        if self.is_kitty_like() || self.var("WT_SESSION").is_some() {
            return true;
        }
        if matches!(
            self.var("TERM_PROGRAM"),
            Some("iTerm.app" | "WezTerm" | "ghostty" | "vscode")
        ) {
            return true;
        }
        self.var("VTE_VERSION")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .is_some_and(|v| v >= 5000)
    }
}

impl CapabilityProbe for EnvProbe {
    fn probe(&self) -> Result<TerminalCapabilities, ProbeError> {
        if !self.is_tty {
            return Err(ProbeError::NotATerminal);
        }
        Ok(TerminalCapabilities {
            true_color: self.true_color(),
            image_protocol: if self.is_kitty_like() {
                ImageProtocol::Kitty
            } else {
                ImageProtocol::None
            },
            supports_osc8: self.supports_osc8(),
        })
    }
}

/// Runs `probe`, falling back to the conservative set on failure.
pub fn negotiate(probe: &dyn CapabilityProbe) -> TerminalCapabilities {
    match probe.probe() {
        Ok(caps) => {
            tracing::info!(
                true_color = caps.true_color,
                image_protocol = ?caps.image_protocol,
                osc8 = caps.supports_osc8,
                "terminal capabilities"
            );
            caps
        }
        Err(err) => {
            tracing::warn!(error = %err, "capability probe failed, using conservative set");
            TerminalCapabilities::conservative()
        }
    }
}
