//! Persistence for the gas list, setpoints, and parameters.
//!
//! The gas list and setpoints keep the fixed-width binary record layout of
//! the original data files (count-prefixed, host-endian), with a magic and
//! version word prepended. A file that lacks the magic is read as the legacy
//! unversioned layout and rewritten in the current format. Parameters are
//! stored as self-describing JSON. Missing files seed the documented
//! defaults; read failures surface to the caller and never touch in-memory
//! state.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::gas::{Gas, GasList, GasStatus, GasType};
use crate::parameters::Parameters;
use crate::setpoints::SetPoints;

pub const GASLIST_FILE_NAME: &str = "gaslist.dat";
pub const SETPOINTS_FILE_NAME: &str = "setpoints.dat";
pub const PARAMETERS_FILE_NAME: &str = "parameters.dat";

const GASLIST_MAGIC: [u8; 4] = *b"DPGL";
const SETPOINTS_MAGIC: [u8; 4] = *b"DPSP";
const FORMAT_VERSION: u32 = 1;

/// File-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Store in the per-user application data directory.
    pub fn open_default() -> Result<Self, StoreError> {
        let base = dirs::data_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Store {
            dir: base.join("decoplan"),
        })
    }

    /// Store rooted at an explicit directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Store { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    // ------------------------------------------------------------------
    // Gas list
    // ------------------------------------------------------------------

    /// Load the gas list, seeding and saving the default single 21% bottom
    /// mix when no file exists. A legacy unversioned file is migrated in
    /// place.
    pub fn load_gas_list(&self) -> Result<GasList, StoreError> {
        let path = self.path(GASLIST_FILE_NAME);
        if !path.exists() {
            info!(?path, "no gas list file, seeding defaults");
            let list = GasList::default();
            if let Err(e) = self.save_gas_list(&list) {
                warn!(error = %e, "could not establish the gas list file");
            }
            return Ok(list);
        }

        let buf = fs::read(&path)?;
        let (mut reader, legacy) = open_records(&buf, GASLIST_MAGIC)?;
        let count = reader.u64()? as usize;
        let mut list = GasList::new();
        for _ in 0..count {
            let o2_pct = reader.f64()?;
            let he_pct = reader.f64()?;
            let type_tag = reader.i32()?;
            let status_tag = reader.i32()?;
            let gas_type = GasType::from_i32(type_tag)
                .ok_or_else(|| StoreError::Malformed(format!("unknown gas type tag {type_tag}")))?;
            let status = GasStatus::from_i32(status_tag).ok_or_else(|| {
                StoreError::Malformed(format!("unknown gas status tag {status_tag}"))
            })?;
            if !(0.0..=100.0).contains(&o2_pct)
                || !(0.0..=100.0).contains(&he_pct)
                || o2_pct + he_pct > 100.0
            {
                return Err(StoreError::Malformed(format!(
                    "gas fractions out of range: o2 {o2_pct}%, he {he_pct}%"
                )));
            }
            list.add(Gas {
                o2_pct,
                he_pct,
                gas_type,
                status,
            });
        }
        debug!(count, "gas list loaded");

        if legacy {
            info!(?path, "migrating legacy gas list file");
            if let Err(e) = self.save_gas_list(&list) {
                warn!(error = %e, "legacy gas list migration failed");
            }
        }
        Ok(list)
    }

    pub fn save_gas_list(&self, list: &GasList) -> Result<(), StoreError> {
        let mut buf = Vec::with_capacity(8 + list.len() * 24);
        buf.extend_from_slice(&GASLIST_MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_ne_bytes());
        buf.extend_from_slice(&(list.len() as u64).to_ne_bytes());
        for gas in &list.gases {
            buf.extend_from_slice(&gas.o2_pct.to_ne_bytes());
            buf.extend_from_slice(&gas.he_pct.to_ne_bytes());
            buf.extend_from_slice(&gas.gas_type.as_i32().to_ne_bytes());
            buf.extend_from_slice(&gas.status.as_i32().to_ne_bytes());
        }
        self.write(GASLIST_FILE_NAME, &buf)
    }

    // ------------------------------------------------------------------
    // Setpoints
    // ------------------------------------------------------------------

    /// Load the setpoint schedule, seeding and saving the documented default
    /// schedule when no file exists.
    pub fn load_set_points(&self) -> Result<SetPoints, StoreError> {
        let path = self.path(SETPOINTS_FILE_NAME);
        if !path.exists() {
            info!(?path, "no setpoints file, seeding defaults");
            let sp = SetPoints::default();
            if let Err(e) = self.save_set_points(&sp) {
                warn!(error = %e, "could not establish the setpoints file");
            }
            return Ok(sp);
        }

        let buf = fs::read(&path)?;
        let (mut reader, legacy) = open_records(&buf, SETPOINTS_MAGIC)?;
        let count = reader.u64()? as usize;
        let mut sp = SetPoints::new();
        for _ in 0..count {
            let depth = reader.f64()?;
            let setpoint = reader.f64()?;
            if !depth.is_finite() || !setpoint.is_finite() {
                return Err(StoreError::Malformed(
                    "non-finite setpoint record".to_string(),
                ));
            }
            sp.add(depth, setpoint);
        }
        debug!(count, "setpoints loaded");

        if legacy {
            info!(?path, "migrating legacy setpoints file");
            if let Err(e) = self.save_set_points(&sp) {
                warn!(error = %e, "legacy setpoints migration failed");
            }
        }
        Ok(sp)
    }

    pub fn save_set_points(&self, sp: &SetPoints) -> Result<(), StoreError> {
        let mut buf = Vec::with_capacity(8 + sp.len() * 16);
        buf.extend_from_slice(&SETPOINTS_MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_ne_bytes());
        buf.extend_from_slice(&(sp.len() as u64).to_ne_bytes());
        for point in sp.as_slice() {
            buf.extend_from_slice(&point.depth.to_ne_bytes());
            buf.extend_from_slice(&point.setpoint.to_ne_bytes());
        }
        self.write(SETPOINTS_FILE_NAME, &buf)
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// Load the parameters, seeding and saving the defaults when no file
    /// exists.
    pub fn load_parameters(&self) -> Result<Parameters, StoreError> {
        let path = self.path(PARAMETERS_FILE_NAME);
        if !path.exists() {
            info!(?path, "no parameters file, seeding defaults");
            let params = Parameters::default();
            if let Err(e) = self.save_parameters(&params) {
                warn!(error = %e, "could not establish the parameters file");
            }
            return Ok(params);
        }
        let buf = fs::read(&path)?;
        serde_json::from_slice(&buf).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    pub fn save_parameters(&self, params: &Parameters) -> Result<(), StoreError> {
        let json =
            serde_json::to_vec_pretty(params).map_err(|e| StoreError::Malformed(e.to_string()))?;
        self.write(PARAMETERS_FILE_NAME, &json)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(name), bytes)?;
        Ok(())
    }
}

/// Position a record reader past the header, detecting the legacy
/// unversioned layout (no magic word, count first).
fn open_records(buf: &[u8], magic: [u8; 4]) -> Result<(Reader<'_>, bool), StoreError> {
    if buf.len() >= 8 && buf[..4] == magic {
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&buf[4..8]);
        let version = u32::from_ne_bytes(version_bytes);
        if version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(version));
        }
        Ok((Reader { buf, pos: 8 }, false))
    } else {
        Ok((Reader { buf, pos: 0 }, true))
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        if self.pos + n > self.buf.len() {
            return Err(StoreError::Malformed("truncated record".to_string()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u64(&mut self) -> Result<u64, StoreError> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_ne_bytes(bytes))
    }

    fn f64(&mut self) -> Result<f64, StoreError> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(f64::from_ne_bytes(bytes))
    }

    fn i32(&mut self) -> Result<i32, StoreError> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(i32::from_ne_bytes(bytes))
    }
}
