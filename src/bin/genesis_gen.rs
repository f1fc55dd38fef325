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

//! Generate a fresh governance genesis: `n` keyholder keypairs (persisted
//! individually under `out_dir`) plus a killswitch root keypair, and
//! print the `[governance]` TOML stanza to wire into `rird.toml`.
//!
//! Usage: `genesis_gen <out_dir> <num_keyholders> <threshold>`

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let out_dir = args.next().unwrap_or_else(|| "data/genesis".to_string());
    let num_keyholders: u32 = args
        .next()
        .unwrap_or_else(|| "3".to_string())
        .parse()
        .context("num_keyholders must be an integer")?;
    let threshold: u32 = args
        .next()
        .unwrap_or_else(|| "2".to_string())
        .parse()
        .context("threshold must be an integer")?;

    if num_keyholders == 0 || threshold == 0 || threshold > num_keyholders {
        bail!("threshold must satisfy 1 <= threshold <= num_keyholders");
    }

    let out_dir = PathBuf::from(out_dir);
    std::fs::create_dir_all(&out_dir)?;

    let mut keyholders = Vec::new();
    for i in 0..num_keyholders {
        let path = out_dir.join(format!("keyholder_{i}.json"));
        let kp = rird::core::identity::generate().context("generating keyholder keypair")?;
        rird::core::identity::save(&path, &kp).context("persisting keyholder keypair")?;
        keyholders.push(kp.public_hex());
    }

    let killswitch_path = out_dir.join("killswitch_root.json");
    let killswitch_kp = rird::core::identity::generate().context("generating killswitch root keypair")?;
    rird::core::identity::save(&killswitch_path, &killswitch_kp).context("persisting killswitch root keypair")?;

    println!("[governance]");
    println!("keyholders = [{}]", keyholders.iter().map(|k| format!("\"{k}\"")).collect::<Vec<_>>().join(", "));
    println!("threshold = {threshold}");
    println!("killswitch_root = \"{}\"", killswitch_kp.public_hex());
    eprintln!(
        "wrote {} keyholder keypairs and 1 killswitch root keypair under {}",
        num_keyholders,
        out_dir.display()
    );

    Ok(())
}
