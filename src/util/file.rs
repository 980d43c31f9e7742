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

use std::{
    fs::{self, File},
    io::{BufReader, Read, Write},
    path::Path,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::Result;

pub fn load_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut st = String::new();
    reader.read_to_string(&mut st)?;
    Ok(st)
}

/// Read `path` as raw bytes, for content that need not be UTF-8.
pub fn load_bytes(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buf = vec![];
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read an image file into a `data:` URL, with the media type taken from
/// the file extension.
pub fn load_data_url(path: &Path) -> Result<String> {
    let bytes = load_bytes(path)?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let mime = match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    };

    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

/// Write `st` to `path`, creating missing parent directories.
pub fn save_file(path: &Path, st: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    file.write_all(st.as_bytes())?;
    Ok(())
}
