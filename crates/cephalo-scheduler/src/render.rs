// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration bundle rendering.
//!
//! Every launched daemon receives its configuration as a gzip'ed tar archive,
//! base64 encoded into one environment variable. The archive holds:
//!
//! | Path | Content |
//! |------|---------|
//! | `etc/ceph/ceph.conf` | cluster configuration |
//! | `etc/ceph/ceph.client.admin.keyring` | `client.admin` key |
//! | `etc/ceph/ceph.mon.keyring` | `mon.` and `client.admin` keys |

use std::fmt::Write as _;
use std::io::{Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::deployment::CephSettings;
use crate::error::{Error, Result};
use crate::model::{Location, Range};
use crate::stores::ClusterSecrets;

/// Environment variable carrying the encoded bundle.
pub const BUNDLE_ENV: &str = "CEPH_CONFIG_TGZ";

/// Archive path of the cluster configuration.
pub const CEPH_CONF_PATH: &str = "etc/ceph/ceph.conf";

/// Archive path of the admin keyring.
pub const ADMIN_KEYRING_PATH: &str = "etc/ceph/ceph.client.admin.keyring";

/// Archive path of the monitor keyring.
pub const MON_KEYRING_PATH: &str = "etc/ceph/ceph.mon.keyring";

/// Everything `ceph.conf` is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Cluster identity and keys.
    pub secrets: &'a ClusterSecrets,
    /// Operator settings.
    pub settings: &'a CephSettings,
    /// Known monitors.
    pub monitors: &'a [Location],
    /// Ports of the OSD being launched.
    pub osd_ports: Option<Range>,
}

fn section(out: &mut String, name: &str, entries: &[(&str, &str)]) {
    let _ = writeln!(out, "[{}]", name);
    for (key, value) in entries {
        let _ = writeln!(out, "{} = {}", key, value);
    }
    out.push('\n');
}

fn pairs(map: &std::collections::BTreeMap<String, String>) -> Vec<(&str, &str)> {
    map.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

/// Render `ceph.conf`.
pub fn render_ceph_conf(ctx: &RenderContext<'_>) -> String {
    let fsid = ctx.secrets.fsid.to_string();
    let members = ctx
        .monitors
        .iter()
        .map(|m| m.hostname.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let hosts = ctx
        .monitors
        .iter()
        .map(Location::addr)
        .collect::<Vec<_>>()
        .join(",");
    let port_min = ctx.osd_ports.map(|r| r.begin.to_string());
    let port_max = ctx.osd_ports.map(|r| r.end.to_string());

    let mut global = vec![
        ("fsid", fsid.as_str()),
        ("mon initial members", members.as_str()),
        ("mon host", hosts.as_str()),
    ];
    global.extend(pairs(&ctx.settings.auth));
    global.extend(pairs(&ctx.settings.global));
    if let (Some(min), Some(max)) = (&port_min, &port_max) {
        global.push(("ms_bind_port_min", min.as_str()));
        global.push(("ms_bind_port_max", max.as_str()));
    }

    let mut out = String::new();
    section(&mut out, "global", &global);
    section(&mut out, "mon", &pairs(&ctx.settings.mon));
    section(&mut out, "osd", &pairs(&ctx.settings.osd));
    section(&mut out, "client", &pairs(&ctx.settings.client));

    for monitor in ctx.monitors {
        let addr = monitor.addr();
        section(
            &mut out,
            &format!("mon.{}", monitor.hostname),
            &[("host", monitor.hostname.as_str()), ("mon addr", addr.as_str())],
        );
    }
    out
}

fn admin_entry(secrets: &ClusterSecrets) -> String {
    format!(
        "[client.admin]\n\tkey = {}\n\tcaps mds = \"allow\"\n\tcaps mon = \"allow *\"\n\tcaps osd = \"allow *\"\n",
        secrets.admin_key
    )
}

/// Render the `client.admin` keyring.
pub fn admin_keyring(secrets: &ClusterSecrets) -> String {
    admin_entry(secrets)
}

/// Render the monitor keyring (`mon.` plus `client.admin`).
pub fn mon_keyring(secrets: &ClusterSecrets) -> String {
    format!(
        "[mon.]\n\tkey = {}\n\tcaps mon = \"allow *\"\n{}",
        secrets.mon_key,
        admin_entry(secrets)
    )
}

fn append_file<W: Write>(builder: &mut tar::Builder<W>, path: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_ustar();
    header.set_path(path)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, data)?;
    Ok(())
}

/// Build the base64 encoded configuration bundle.
pub fn build_bundle(ctx: &RenderContext<'_>) -> Result<String> {
    let conf = render_ceph_conf(ctx);

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    append_file(&mut builder, CEPH_CONF_PATH, conf.as_bytes())?;
    append_file(
        &mut builder,
        ADMIN_KEYRING_PATH,
        admin_keyring(ctx.secrets).as_bytes(),
    )?;
    append_file(
        &mut builder,
        MON_KEYRING_PATH,
        mon_keyring(ctx.secrets).as_bytes(),
    )?;

    let encoder = builder.into_inner()?;
    let bytes = encoder.finish()?;
    Ok(STANDARD.encode(bytes))
}

/// Extract one file from an encoded bundle.
pub fn read_bundle_file(encoded: &str, path: &str) -> Result<Option<String>> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Bundle(format!("invalid base64: {}", e)))?;
    let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_str() == Some(path) {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}
