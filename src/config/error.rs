// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

/// Typed error for configuration document failures so callers can distinguish
/// e.g. an unreadable file from a parse error without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read configuration document: {0}")]
    Read(#[source] std::io::Error),
    #[error("unable to parse configuration document: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("unable to write configuration document: {0}")]
    Write(#[source] std::io::Error),
}
