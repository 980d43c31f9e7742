/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2024 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{fs, io::Write, path::Path};

use crate::Result;

/// Write the bundled default config to `path` unless a file is already
/// there, so the user has something to edit on first run.
pub fn spawn_config(path: &Path, contents: &[u8]) -> Result<()> {
    if path.exists() {
        return Ok(())
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    println!("Created default config file in {path:?}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_config_is_left_alone() {
        let dir = std::env::temp_dir().join(format!("dappstore-cli-{}", std::process::id()));
        let path = dir.join("dapp_config.toml");

        spawn_config(&path, b"endpoint = \"a\"\n").unwrap();
        spawn_config(&path, b"endpoint = \"b\"\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "endpoint = \"a\"\n");

        fs::remove_dir_all(dir).unwrap();
    }
}
