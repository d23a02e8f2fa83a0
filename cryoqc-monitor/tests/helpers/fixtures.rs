//! Project Fixtures
//!
//! Builds a small project tree the way the processing pipeline lays it out:
//! an import stage with `movies.sqlite`, an alignment stage with
//! `micrographs.sqlite` plus aligned micrographs, and a CTF stage with
//! `ctfs.sqlite`, power spectra and EPA curves.

use super::store_builder::{int, real, text, StoreBuilder};
use anyhow::Result;
use std::path::{Path, PathBuf};

const MRC_HEADER_LEN: usize = 1024;

/// Little-endian float32 MRC with a single section of a diagonal gradient
pub fn write_mrc_file(path: &Path, nx: i32, ny: i32) -> Result<PathBuf> {
    let mut bytes = vec![0u8; MRC_HEADER_LEN];
    bytes[0..4].copy_from_slice(&nx.to_le_bytes());
    bytes[4..8].copy_from_slice(&ny.to_le_bytes());
    bytes[8..12].copy_from_slice(&1i32.to_le_bytes());
    bytes[12..16].copy_from_slice(&2i32.to_le_bytes());
    bytes[208..212].copy_from_slice(b"MAP ");
    bytes[212] = 0x44;
    bytes[213] = 0x44;

    for y in 0..ny {
        for x in 0..nx {
            bytes.extend_from_slice(&((x + y) as f32).to_le_bytes());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(path.to_path_buf())
}

/// EPA curve whose CCC falls linearly from 1.0 to 0.0 over `samples` rows
///
/// Resolutions run from 30 Å down to 3 Å (increasing spatial frequency).
pub fn write_epa_file(path: &Path, samples: usize) -> Result<PathBuf> {
    let mut text = String::from("# Resolution CTFsim EPA EPAbg CCC\n");
    let last = samples.saturating_sub(1).max(1) as f64;

    for i in 0..samples {
        let t = i as f64 / last;
        let frequency = 1.0 / 30.0 + t * (1.0 / 3.0 - 1.0 / 30.0);
        let resolution = 1.0 / frequency;
        let ctf_sim = (t * 12.0).sin().abs();
        let epa = 5.0 - 3.0 * t;
        let ccc = 1.0 - t;
        text.push_str(&format!(
            "{:.6} {:.6} {:.6} {:.6} {:.6}\n",
            resolution,
            ctf_sim,
            epa,
            epa - 0.5,
            ccc
        ));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(path.to_path_buf())
}

/// A movie file of `len` bytes
pub fn write_movie_file(path: &Path, len: usize) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, vec![7u8; len])?;
    Ok(path.to_path_buf())
}

/// Directory layout of a synthetic project
pub struct ProjectLayout {
    pub root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn import_dir(&self) -> PathBuf {
        self.root.join("Runs/000002_ProtImportMovies")
    }

    pub fn align_dir(&self) -> PathBuf {
        self.root.join("Runs/000041_ProtMotionCorr")
    }

    pub fn ctf_dir(&self) -> PathBuf {
        self.root.join("Runs/000064_CistemProtCTFFind")
    }

    /// Relative path of the raw movie, as the import store records it
    pub fn movie_rel(&self, id: &str) -> String {
        format!("Runs/000002_ProtImportMovies/extra/{}.tif", id)
    }

    pub fn micrograph_rel(&self, id: &str) -> String {
        format!("Runs/000041_ProtMotionCorr/extra/{}_aligned_mic.mrc", id)
    }

    pub fn psd_rel(&self, id: &str) -> String {
        format!("Runs/000064_CistemProtCTFFind/extra/{}_aligned_mic_ctfEstimation.mrc", id)
    }

    /// Import store with acquisition labels and dose information
    pub async fn write_movies_store(&self, ids: &[&str]) -> Result<PathBuf> {
        let mut builder = StoreBuilder::new(self.import_dir().join("movies.sqlite"))
            .column("_filename")
            .column("_acquisition._magnification")
            .column("_acquisition._voltage")
            .column("_samplingRate")
            .column("_acquisition._doseInitial")
            .column("_acquisition._dosePerFrame")
            .column("_frames");

        for id in ids {
            builder = builder.row(vec![
                text(&self.movie_rel(id)),
                int(59000),
                real(300.0),
                real(0.83),
                real(0.0),
                real(1.25),
                int(40),
            ]);
        }
        builder.build().await
    }

    /// Alignment output: a movie store carrying shift traces and the
    /// micrograph store naming the aligned micrographs
    pub async fn write_alignment_stores(&self, ids: &[&str]) -> Result<()> {
        let mut movies = StoreBuilder::new(self.align_dir().join("movies.sqlite"))
            .column("_filename")
            .column("_alignment._xshifts")
            .column("_alignment._yshifts");
        let mut micrographs =
            StoreBuilder::new(self.align_dir().join("micrographs.sqlite")).column("_filename");

        for id in ids {
            movies = movies.row(vec![
                text(&self.movie_rel(id)),
                text("[0.0, 3.0, 3.0, 6.0]"),
                text("[0.0, 4.0, 4.0, 4.0]"),
            ]);
            micrographs = micrographs.row(vec![text(&self.micrograph_rel(id))]);
            write_mrc_file(&self.root.join(self.micrograph_rel(id)), 48, 32)?;
        }

        movies.build().await?;
        micrographs.build().await?;
        Ok(())
    }

    /// CTF output with PSD files and EPA curves
    pub async fn write_ctf_store(&self, ids: &[&str]) -> Result<PathBuf> {
        let mut builder = StoreBuilder::new(self.ctf_dir().join("ctfs.sqlite"))
            .column("_micObj._filename")
            .column("_defocusU")
            .column("_defocusV")
            .column("_defocusAngle")
            .column("_psdFile")
            .column("_ctffind4_crossCorrelation");

        for id in ids {
            let psd = self.psd_rel(id);
            builder = builder.row(vec![
                text(&self.micrograph_rel(id)),
                real(15234.5),
                real(14820.0),
                real(42.7),
                text(&psd),
                real(0.081),
            ]);
            let psd_path = self.root.join(&psd);
            write_mrc_file(&psd_path, 32, 32)?;
            write_epa_file(&cryoqc_monitor::analysis::epa_path_for_psd(&psd_path), 60)?;
        }
        builder.build().await
    }

    /// All three stages for `ids`
    pub async fn write_all(&self, ids: &[&str]) -> Result<()> {
        self.write_movies_store(ids).await?;
        self.write_alignment_stores(ids).await?;
        self.write_ctf_store(ids).await?;
        Ok(())
    }
}
