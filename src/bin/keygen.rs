// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Generate (or reuse) this node's agent identity and print its hex
//! public key. Usage: `keygen [path-to-identity.json]`.

use anyhow::{Context, Result};
use std::path::PathBuf;

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/identity.json".to_string());
    let path = PathBuf::from(path);

    let kp = rird::core::identity::load_or_create(&path)
        .with_context(|| format!("loading or creating identity at {}", path.display()))?;

    println!("{}", kp.public_hex());
    Ok(())
}
