//! Export orchestrator.
//!
//! Runs the export as a fixed sequence, each step stacking onto the image
//! produced by the previous one:
//!
//! 1. app layer (`launch/app`)
//! 2. buildpack layers, written fresh or reused from the previous image
//! 3. web process command
//! 4. build metadata label

use std::path::{Path, PathBuf};

use a3s_pack_core::error::Result;
use a3s_pack_core::BUILD_LABEL;

use super::launch::{read_layer_data, LaunchDir, LaunchMetadata};
use super::layer::write_layer;
use super::metadata::BuildMetadata;
use super::reuse::{attach_existing, resolve, LayerAction, PreviousBuild};
use crate::oci::OciImage;

/// Composes a launch directory into an image.
#[derive(Debug, Clone)]
pub struct Exporter {
    /// Buildpack ids in group order
    buildpacks: Vec<String>,
    /// Scratch area for layer archives
    work_dir: PathBuf,
}

impl Exporter {
    /// Create an exporter writing layer archives into `work_dir`.
    ///
    /// The archives back the layers of the returned image, so `work_dir`
    /// must outlive every use of that image. Removing it is up to the caller.
    pub fn new(buildpacks: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            buildpacks,
            work_dir: work_dir.into(),
        }
    }

    pub fn buildpacks(&self) -> &[String] {
        &self.buildpacks
    }

    /// Export `launch` on top of `run_image`.
    ///
    /// Layers whose directory is absent are taken from `previous`, located
    /// through the build metadata it carries. Nothing is returned unless
    /// every step succeeds.
    pub fn export(
        &self,
        launch: &LaunchDir,
        run_image: &OciImage,
        previous: Option<&OciImage>,
    ) -> Result<OciImage> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let mut written = 0usize;

        let stack_sha = run_image.digest()?;
        let mut metadata = BuildMetadata::new(stack_sha.clone());
        tracing::debug!(stack = %stack_sha, "Starting export");

        let (mut image, app_sha) = write_layer(
            run_image,
            &self.scratch_path(&run_id, written),
            &launch.app_dir(),
            Path::new("launch/app"),
        )?;
        tracing::info!(diff_id = %app_sha, "Wrote app layer");
        metadata.set_app(app_sha);

        let prior = BuildMetadata::from_image_optional(previous);
        let previous_build = match (prior.as_ref(), previous) {
            (Some(metadata), Some(image)) => Some(PreviousBuild { metadata, image }),
            _ => None,
        };

        for buildpack in &self.buildpacks {
            metadata.add_buildpack(buildpack);

            for candidate in launch.layer_candidates(buildpack)? {
                let diff_id = match resolve(buildpack, &candidate.name, candidate.has_dir, true, previous_build) {
                    LayerAction::NeedsWrite => {
                        let target = Path::new("launch").join(buildpack).join(&candidate.name);
                        written += 1;
                        let (next, diff_id) = write_layer(
                            &image,
                            &self.scratch_path(&run_id, written),
                            &candidate.dir,
                            &target,
                        )?;
                        tracing::info!(buildpack = %buildpack, layer = %candidate.name, diff_id = %diff_id, "Wrote layer");
                        image = next;
                        diff_id
                    }
                    LayerAction::UseExisting { diff_id, source } => {
                        image = attach_existing(&image, source, &diff_id, buildpack, &candidate.name)?;
                        tracing::info!(buildpack = %buildpack, layer = %candidate.name, diff_id = %diff_id, "Reusing layer from previous image");
                        diff_id
                    }
                    LayerAction::Skip => continue,
                    LayerAction::Fail(err) => return Err(err),
                };

                let data = read_layer_data(&candidate.descriptor)?;
                metadata.accumulate(buildpack, &candidate.name, diff_id, data);
            }
        }
        tracing::debug!(buildpacks = self.buildpacks.len(), "Processed buildpack layers");

        let launch_metadata = LaunchMetadata::read(&launch.app_metadata_path())?;
        let command = launch_metadata.web_command()?;
        image = image.with_cmd(vec![command.to_string()])?;
        tracing::debug!(command = %command, "Set web command");

        image = image.with_label(BUILD_LABEL, &metadata.encode()?)?;
        tracing::debug!(layers = image.layers().len(), "Export complete");

        Ok(image)
    }

    /// Scratch archive path of the `seq`-th layer written in run `run_id`.
    fn scratch_path(&self, run_id: &str, seq: usize) -> PathBuf {
        self.work_dir.join(format!("{}.{}.tar.gz", run_id, seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a3s_pack_core::error::PackError;
    use std::fs;
    use tempfile::TempDir;

    fn write_launch(root: &Path, web: bool) {
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("app/index.html"), "hello").unwrap();
        let processes = if web {
            "[[processes]]\ntype = \"web\"\ncommand = \"./start\"\n"
        } else {
            "[[processes]]\ntype = \"worker\"\ncommand = \"./work\"\n"
        };
        fs::write(root.join("app/metadata.toml"), processes).unwrap();
    }

    #[test]
    fn test_scratch_paths() {
        let exporter = Exporter::new(vec![], "/work");
        assert_eq!(
            exporter.scratch_path("run1", 0),
            PathBuf::from("/work/run1.0.tar.gz")
        );
        assert_ne!(exporter.scratch_path("run1", 1), exporter.scratch_path("run2", 1));
    }

    #[test]
    fn test_dotted_ids_keep_separate_archives() {
        let launch_tmp = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_launch(launch_tmp.path(), true);
        for (bp, layer, content) in [("a.b", "c", "first"), ("a", "b.c", "second")] {
            let dir = launch_tmp.path().join(bp).join(layer);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("file.txt"), content).unwrap();
            fs::write(launch_tmp.path().join(bp).join(format!("{}.toml", layer)), "").unwrap();
        }

        let launch = LaunchDir::open(launch_tmp.path()).unwrap();
        let exporter = Exporter::new(vec!["a.b".to_string(), "a".to_string()], work.path());
        let image = exporter.export(&launch, &OciImage::scratch(), None).unwrap();

        assert_eq!(image.layers().len(), 3);
        assert_ne!(image.layers()[1].blob_path, image.layers()[2].blob_path);
        assert_eq!(
            image.layers()[1].read_file("launch/a.b/c/file.txt").unwrap(),
            Some(b"first".to_vec())
        );
        assert_eq!(
            image.layers()[2].read_file("launch/a/b.c/file.txt").unwrap(),
            Some(b"second".to_vec())
        );
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_export_app_only() {
        let launch_tmp = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_launch(launch_tmp.path(), true);

        let launch = LaunchDir::open(launch_tmp.path()).unwrap();
        let run_image = OciImage::scratch();
        let exporter = Exporter::new(vec!["missing.bp".to_string()], work.path());
        let image = exporter.export(&launch, &run_image, None).unwrap();

        assert_eq!(image.layers().len(), 1);
        assert_eq!(image.cmd(), Some(vec!["./start".to_string()]));

        let metadata = BuildMetadata::from_image(&image).unwrap();
        assert_eq!(metadata.stack.sha, run_image.digest().unwrap());
        assert_eq!(metadata.app.sha, image.diff_ids()[0]);
        assert_eq!(metadata.buildpacks.len(), 1);
        assert_eq!(metadata.buildpacks[0].key, "missing.bp");
        assert!(metadata.buildpacks[0].layers.is_empty());
    }

    #[test]
    fn test_export_without_web_process_fails() {
        let launch_tmp = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_launch(launch_tmp.path(), false);

        let launch = LaunchDir::open(launch_tmp.path()).unwrap();
        let exporter = Exporter::new(vec![], work.path());
        let err = exporter.export(&launch, &OciImage::scratch(), None).unwrap_err();
        assert!(matches!(err, PackError::MissingWebProcess(_)));
    }

    #[test]
    fn test_export_leaves_run_image_untouched() {
        let launch_tmp = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_launch(launch_tmp.path(), true);

        let launch = LaunchDir::open(launch_tmp.path()).unwrap();
        let run_image = OciImage::scratch();
        let before = run_image.digest().unwrap();
        Exporter::new(vec![], work.path())
            .export(&launch, &run_image, None)
            .unwrap();
        assert_eq!(run_image.digest().unwrap(), before);
        assert!(run_image.layers().is_empty());
    }
}
