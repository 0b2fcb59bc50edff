//! Resampling engines that apply an accumulated transform to one frame.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use crate::config::{Interpolation, ProcessingConfig, ResamplerBackend};
use crate::error::ResampleError;
use crate::transform::AffineTransform;
use crate::warp::warp_image;

/// Writes `source` warped by `transform` to `output`.
///
/// Implementations are shared across the worker pool and must not keep
/// per-frame state.
pub trait Resampler: Send + Sync {
    fn resample(
        &self,
        source: &Path,
        transform: &AffineTransform,
        output: &Path,
    ) -> Result<(), ResampleError>;

    fn name(&self) -> &str;
}

pub fn from_config(config: &ProcessingConfig) -> Box<dyn Resampler> {
    match &config.resampler {
        ResamplerBackend::InProcess => Box::new(InProcessResampler::new(config.interpolation)),
        ResamplerBackend::Command { program, args } => Box::new(CommandResampler::new(
            program.clone(),
            args.clone(),
            config.temp_dir(),
        )),
    }
}

pub struct InProcessResampler {
    interpolation: Interpolation,
}

impl InProcessResampler {
    pub fn new(interpolation: Interpolation) -> Self {
        Self { interpolation }
    }
}

impl Resampler for InProcessResampler {
    fn resample(
        &self,
        source: &Path,
        transform: &AffineTransform,
        output: &Path,
    ) -> Result<(), ResampleError> {
        let img = image::open(source).map_err(|source_err| ResampleError::Image {
            path: source.to_path_buf(),
            source: source_err,
        })?;

        if transform.inverse().is_none() {
            return Err(ResampleError::Singular);
        }
        let warped = warp_image(&img, transform.matrix(), self.interpolation).ok_or_else(|| {
            ResampleError::UnsupportedColor {
                path: source.to_path_buf(),
                color: format!("{:?}", img.color()),
            }
        })?;

        warped.save(output).map_err(|e| ResampleError::Image {
            path: output.to_path_buf(),
            source: e,
        })
    }

    fn name(&self) -> &str {
        "in-process"
    }
}

/// Delegates resampling to an external program.
///
/// Each argument is a template: `{input}` becomes the source frame,
/// `{output}` the file the program must write and `{matrix}` a temporary
/// text file holding the 3x3 transform matrix.
pub struct CommandResampler {
    program: String,
    args: Vec<String>,
    temp_dir: std::path::PathBuf,
}

impl CommandResampler {
    pub fn new(program: String, args: Vec<String>, temp_dir: std::path::PathBuf) -> Self {
        Self {
            program,
            args,
            temp_dir,
        }
    }

    fn render_args(&self, input: &Path, output: &Path, matrix: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{matrix}", &matrix.to_string_lossy())
            })
            .collect()
    }
}

impl Resampler for CommandResampler {
    fn resample(
        &self,
        source: &Path,
        transform: &AffineTransform,
        output: &Path,
    ) -> Result<(), ResampleError> {
        let io_err = |path: &Path, source: std::io::Error| ResampleError::Io {
            path: path.to_path_buf(),
            source,
        };

        // removed when dropped, after the program has exited
        let mut matrix_file = tempfile::Builder::new()
            .prefix("blockface-matrix-")
            .suffix(".txt")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| io_err(&self.temp_dir, e))?;
        matrix_file
            .write_all(transform.to_matrix_text().as_bytes())
            .and_then(|_| matrix_file.flush())
            .map_err(|e| io_err(matrix_file.path(), e))?;

        let args = self.render_args(source, output, matrix_file.path());
        log::debug!("Running {} {}", self.program, args.join(" "));

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| ResampleError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(ResampleError::CommandFailed {
                program: self.program.clone(),
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let written = std::fs::metadata(output)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(ResampleError::MissingOutput {
                program: self.program.clone(),
                output: output.to_path_buf(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn in_process_writes_warped_frame() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("frame.png");
        let out = dir.path().join("warped.png");
        let mut img = GrayImage::new(6, 6);
        img.put_pixel(1, 1, Luma([250]));
        img.save(&src).unwrap();

        InProcessResampler::new(Interpolation::Nearest)
            .resample(&src, &AffineTransform::translation(3.0, 2.0), &out)
            .unwrap();

        let warped = image::open(&out).unwrap().to_luma8();
        assert_eq!(warped.get_pixel(4, 3)[0], 250);
    }

    #[test]
    fn placeholders_are_substituted() {
        let resampler = CommandResampler::new(
            "tool".into(),
            vec!["-in={input}".into(), "{output}".into(), "--m".into(), "{matrix}".into()],
            std::env::temp_dir(),
        );
        let args = resampler.render_args(
            Path::new("/a/in.png"),
            Path::new("/b/out.png"),
            Path::new("/c/m.txt"),
        );
        assert_eq!(args, vec!["-in=/a/in.png", "/b/out.png", "--m", "/c/m.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn command_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let resampler = CommandResampler::new(
            "sh".into(),
            vec!["-c".into(), "echo broken >&2; exit 3".into()],
            dir.path().to_path_buf(),
        );
        let err = resampler
            .resample(
                Path::new("in.png"),
                &AffineTransform::translation(1.0, 0.0),
                &dir.path().join("out.png"),
            )
            .unwrap_err();

        match err {
            ResampleError::CommandFailed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {other}"),
        }
        // matrix file is gone again
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn command_receives_matrix_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let resampler = CommandResampler::new(
            "sh".into(),
            vec!["-c".into(), "cp \"$0\" \"$1\"".into(), "{matrix}".into(), "{output}".into()],
            dir.path().to_path_buf(),
        );
        resampler
            .resample(
                Path::new("in.png"),
                &AffineTransform::from_rows([[1.0, 0.0, 5.0], [0.0, 1.0, 6.0]]),
                &out,
            )
            .unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text, "1 0 5\n0 1 6\n0 0 1\n");
    }
}
