use std::{
    env::{self, VarError},
    panic::catch_unwind,
};

use anyhow::{anyhow, bail};
use image::ImageBuffer;
use once_cell::sync::Lazy;

use super::Image;

/// Supported JPEG decoding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JpegBackend {
    /// Uses the `jpeg-decoder` crate, a robust but slow pure-Rust JPEG decoder.
    JpegDecoder,
    /// Uses the `mozjpeg` crate, a wrapper around Mozilla's libjpeg fork. Robust and fast-ish, but
    /// C.
    MozJpeg,
    /// Uses the `zune-jpeg` crate, a pure-Rust JPEG decoder somewhat faster than `jpeg-decoder`.
    ZuneJpeg,
}

const DEFAULT_BACKEND: JpegBackend = JpegBackend::MozJpeg;

const BACKEND_VAR: &str = "HANDREC_JPEG_BACKEND";

impl JpegBackend {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "mozjpeg" => Self::MozJpeg,
            "zune-jpeg" => Self::ZuneJpeg,
            "jpeg-decoder" => Self::JpegDecoder,
            _ => return None,
        })
    }
}

static JPEG_BACKEND: Lazy<JpegBackend> = Lazy::new(|| {
    let backend = match env::var(BACKEND_VAR) {
        Ok(v) => JpegBackend::from_name(&v).unwrap_or_else(|| {
            log::warn!("invalid value set for `{BACKEND_VAR}`: '{v}'; using {DEFAULT_BACKEND:?}");
            DEFAULT_BACKEND
        }),
        Err(VarError::NotPresent) => DEFAULT_BACKEND,
        Err(VarError::NotUnicode(s)) => {
            log::warn!(
                "invalid value set for `{BACKEND_VAR}`: {}; using {DEFAULT_BACKEND:?}",
                s.to_string_lossy()
            );
            DEFAULT_BACKEND
        }
    };
    log::debug!("using JPEG decode backend: {:?}", backend);
    backend
});

pub(super) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    decode_with(*JPEG_BACKEND, data)
}

fn decode_with(backend: JpegBackend, data: &[u8]) -> anyhow::Result<Image> {
    let buf = match backend {
        JpegBackend::JpegDecoder => {
            use jpeg_decoder::PixelFormat;

            let mut decoder = jpeg_decoder::Decoder::new(data);
            let pixels = decoder.decode()?;
            let info = decoder
                .info()
                .ok_or_else(|| anyhow!("JPEG headers not decoded"))?;
            let rgba: Vec<u8> = match info.pixel_format {
                PixelFormat::RGB24 => pixels
                    .chunks_exact(3)
                    .flat_map(|p| [p[0], p[1], p[2], 255])
                    .collect(),
                PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l, 255]).collect(),
                other => bail!("unsupported pixel format {other:?}"),
            };
            ImageBuffer::from_raw(info.width.into(), info.height.into(), rgba)
                .ok_or_else(|| anyhow!("decoded JPEG has invalid buffer size"))?
        }
        JpegBackend::MozJpeg => {
            // mozjpeg crate unfortunately reports errors only via unwinding
            let (buf, width, height) = catch_unwind(|| -> anyhow::Result<_> {
                let mut decompress = mozjpeg::Decompress::new_mem(data)?;

                // Tune settings for decode performance.
                decompress.do_fancy_upsampling(false);
                decompress.dct_method(mozjpeg::DctMethod::IntegerFast);

                let mut decompress = decompress.rgba()?;
                let buf = decompress
                    .read_scanlines_flat()
                    .ok_or_else(|| anyhow!("failed to decode image"))?;
                Ok((buf, decompress.width(), decompress.height()))
            })
            .map_err(|payload| match payload.downcast::<String>() {
                Ok(string) => anyhow::Error::msg(string),
                Err(_) => anyhow!("<unknown panic message>"),
            })??;

            ImageBuffer::from_raw(width.try_into()?, height.try_into()?, buf)
                .ok_or_else(|| anyhow!("decoded JPEG has invalid buffer size"))?
        }
        JpegBackend::ZuneJpeg => {
            use zune_jpeg::zune_core::colorspace::ColorSpace;
            use zune_jpeg::zune_core::options::DecoderOptions;

            let mut decomp = zune_jpeg::JpegDecoder::new_with_options(
                DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGBA),
                data,
            );
            decomp.decode_headers()?;
            match decomp.get_output_colorspace() {
                Some(ColorSpace::RGBA) => {}
                other => bail!("unsupported colorspace {other:?} (expected RGBA)"),
            }

            let size = decomp
                .output_buffer_size()
                .ok_or_else(|| anyhow!("JPEG headers not decoded"))?;
            let mut buf = vec![0; size];
            decomp.decode_into(&mut buf)?;
            let (width, height) = decomp
                .dimensions()
                .ok_or_else(|| anyhow!("JPEG headers not decoded"))?;
            ImageBuffer::from_raw(width.into(), height.into(), buf)
                .ok_or_else(|| anyhow!("decoded JPEG has invalid buffer size"))?
        }
    };

    Ok(Image { buf })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{codecs::jpeg::JpegEncoder, ColorType};

    use super::*;

    fn encode_test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let rgb = vec![200; (width * height * 3) as usize];
        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, 95)
            .encode(&rgb, width, height, ColorType::Rgb8)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn backend_names() {
        assert_eq!(JpegBackend::from_name("mozjpeg"), Some(JpegBackend::MozJpeg));
        assert_eq!(JpegBackend::from_name("zune-jpeg"), Some(JpegBackend::ZuneJpeg));
        assert_eq!(
            JpegBackend::from_name("jpeg-decoder"),
            Some(JpegBackend::JpegDecoder)
        );
        assert_eq!(JpegBackend::from_name("vaapi"), None);
    }

    #[test]
    fn decode_with_all_backends() {
        let jpeg = encode_test_jpeg(16, 8);
        for backend in [
            JpegBackend::JpegDecoder,
            JpegBackend::MozJpeg,
            JpegBackend::ZuneJpeg,
        ] {
            let image = decode_with(backend, &jpeg).unwrap();
            assert_eq!(image.width(), 16, "{backend:?}");
            assert_eq!(image.height(), 8, "{backend:?}");
            let px = image.get(3, 3);
            assert!((px.r() as i32 - 200).abs() <= 3, "{backend:?}: {px:?}");
            assert_eq!(px.a(), 255);
        }
    }

    #[test]
    fn corrupt_data_is_an_error() {
        for backend in [JpegBackend::JpegDecoder, JpegBackend::ZuneJpeg] {
            assert!(decode_with(backend, b"not a jpeg").is_err(), "{backend:?}");
        }
    }
}
