// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tierprof config` command: print the effective options.
//!
//! With `--config` the file is parsed and validated first, so this doubles
//! as a checker for options files.

use std::path::PathBuf;

pub fn execute(path: Option<PathBuf>) -> anyhow::Result<()> {
    let options = super::load_options(path.as_deref())?;
    if let Some(p) = &path {
        eprintln!("# {} is valid", p.display());
    }
    print!("{}", options.to_toml()?);
    Ok(())
}
