use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::codecs::webp::{WebPDecoder, WebPEncoder};
use image::{AnimationDecoder, DynamicImage, ExtendedColorType, ImageEncoder};
use tokio::process::Command;

use crate::error::MediaError;

pub struct TranscodeResult {
	pub bytes: Vec<u8>,
	pub width: u32,
	pub height: u32,
}

/// Decodes every frame of an animated source, or a single frame for a still
/// image. Per-frame timing isn't tracked here: the external transcoder reads
/// timing straight from the source bytes, and the in-process fallback only
/// ever keeps the first frame.
fn decode_frames(bytes: &[u8]) -> Result<Vec<DynamicImage>, MediaError> {
	let format = image::guess_format(bytes).ok();

	if format == Some(image::ImageFormat::Gif) {
		let decoder = GifDecoder::new(Cursor::new(bytes))?;
		return Ok(decoder
			.into_frames()
			.collect_frames()?
			.into_iter()
			.map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()))
			.collect());
	}

	if format == Some(image::ImageFormat::WebP) {
		if let Ok(decoder) = WebPDecoder::new(Cursor::new(bytes)) {
			if let Ok(frames) = decoder.into_frames().collect_frames() {
				if frames.len() > 1 {
					return Ok(frames.into_iter().map(|frame| DynamicImage::ImageRgba8(frame.into_buffer())).collect());
				}
			}
		}
	}

	Ok(vec![image::load_from_memory(bytes)?])
}

fn normalize_mode(image: DynamicImage) -> DynamicImage {
	if image.color().has_alpha() {
		DynamicImage::ImageRgba8(image.to_rgba8())
	} else {
		DynamicImage::ImageRgb8(image.to_rgb8())
	}
}

fn encode_still_webp(image: &DynamicImage) -> Result<Vec<u8>, MediaError> {
	let mut buf = Vec::new();
	let encoder = WebPEncoder::new_lossless(&mut buf);
	match image {
		DynamicImage::ImageRgba8(rgba) => {
			encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)?
		}
		_ => {
			let rgb = image.to_rgb8();
			encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?
		}
	}
	Ok(buf)
}

/// Shells out to an external WebP/ffmpeg-style transcoder when one is
/// configured, for animated inputs where true multi-frame WebP output
/// matters. Returns `None` on any failure so the caller can fall back.
async fn transcode_animated_via_binary(binary: &std::path::Path, bytes: &[u8], quality: u8) -> Option<TranscodeResult> {
	let tmp_in = tempfile::NamedTempFile::new().ok()?;
	tokio::fs::write(tmp_in.path(), bytes).await.ok()?;
	let tmp_out = tempfile::Builder::new().suffix(".webp").tempfile().ok()?;

	// quality 80 -> crf 40 (lower crf is higher quality, range 0-63)
	let crf = (80i32 - (quality as i32) * 30 / 100).clamp(0, 63);

	let output = Command::new(binary)
		.arg("-i")
		.arg(tmp_in.path())
		.arg("-c:v")
		.arg("libwebp")
		.arg("-quality")
		.arg("100")
		.arg("-crf")
		.arg(crf.to_string())
		.arg("-loop")
		.arg("0")
		.arg("-y")
		.arg(tmp_out.path())
		.output()
		.await
		.ok()?;

	if !output.status.success() {
		return None;
	}

	let webp_bytes = tokio::fs::read(tmp_out.path()).await.ok()?;
	let dims = image::load_from_memory(&webp_bytes).ok()?;
	Some(TranscodeResult { width: dims.width(), height: dims.height(), bytes: webp_bytes })
}

/// Transcodes arbitrary image bytes to WebP. Animated sources are preserved
/// in full when the external-binary fast path is configured and succeeds;
/// otherwise only the first frame survives. `quality` only affects the
/// external-binary fast path — the in-process encoder is lossless.
pub async fn image_to_webp(
	bytes: &[u8],
	quality: u8,
	ffmpeg_binary: Option<&std::path::Path>,
) -> Result<TranscodeResult, MediaError> {
	let frames = decode_frames(bytes)?;
	let first = frames.first().ok_or(MediaError::NoFrames)?;
	let width = first.width();
	let height = first.height();

	if frames.len() > 1 {
		if let Some(binary) = ffmpeg_binary {
			if let Some(result) = transcode_animated_via_binary(binary, bytes, quality).await {
				return Ok(result);
			}
			tracing::debug!("external transcoder failed, falling back to first-frame still encode");
		}
	}

	// In-process fallback can't emit multi-frame WebP; keep the first frame
	// only rather than losing the image entirely.
	let normalized = normalize_mode(first.clone());
	let encoded = encode_still_webp(&normalized)?;
	Ok(TranscodeResult { bytes: encoded, width, height })
}

/// Aspect-preserving thumbnail, capped at `max_w`x`max_h`.
pub fn thumbnail_webp(webp_bytes: &[u8], max_w: u32, max_h: u32) -> Result<Vec<u8>, MediaError> {
	let image = image::load_from_memory(webp_bytes)?;
	let thumb = image.thumbnail(max_w, max_h);
	encode_still_webp(&normalize_mode(thumb))
}

/// Average-color dominant-color extraction: shrink to 1x1 with a
/// high-quality filter and read off the resulting pixel.
pub fn dominant_color(webp_bytes: &[u8]) -> Option<String> {
	let image = image::load_from_memory(webp_bytes).ok()?;
	let small = image.resize_exact(1, 1, image::imageops::FilterType::Lanczos3).to_rgb8();
	let pixel = small.get_pixel(0, 0);
	Some(format!("#{:02x}{:02x}{:02x}", pixel[0], pixel[1], pixel[2]))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn solid_png(w: u32, h: u32) -> Vec<u8> {
		let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(w, h, image::Rgb([10, 20, 30])));
		let mut buf = Vec::new();
		img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
		buf
	}

	#[tokio::test]
	async fn transcodes_still_png_to_webp() {
		let png = solid_png(4, 4);
		let result = image_to_webp(&png, 80, None).await.unwrap();
		assert_eq!(result.width, 4);
		assert_eq!(result.height, 4);
		assert!(result.bytes.starts_with(b"RIFF"));
	}

	#[test]
	fn thumbnail_shrinks_to_bounds() {
		let png = solid_png(600, 300);
		let webp = encode_still_webp(&normalize_mode(image::load_from_memory(&png).unwrap())).unwrap();
		let thumb = thumbnail_webp(&webp, 300, 300).unwrap();
		let decoded = image::load_from_memory(&thumb).unwrap();
		assert!(decoded.width() <= 300 && decoded.height() <= 300);
	}

	#[test]
	fn dominant_color_is_stable_for_solid_image() {
		let png = solid_png(10, 10);
		let webp = encode_still_webp(&normalize_mode(image::load_from_memory(&png).unwrap())).unwrap();
		let color = dominant_color(&webp).unwrap();
		assert_eq!(color, "#0a141e");
	}
}
