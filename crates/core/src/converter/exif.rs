//! Minimal EXIF (TIFF IFD) reader for the image metadata operation.

use std::collections::BTreeMap;

const EXIF_IFD_POINTER: u16 = 0x8769;
const GPS_IFD_POINTER: u16 = 0x8825;
/// Values longer than this are summarised instead of dumped.
const MAX_VALUE_COUNT: usize = 64;

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

struct Reader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    fn u16_at(&self, offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = self.data.get(offset..offset + 2)?.try_into().ok()?;
        Some(match self.order {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(offset..offset + 4)?.try_into().ok()?;
        Some(match self.order {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }
}

/// Parses a raw EXIF block (TIFF header onwards, optionally prefixed by
/// `Exif\0\0`) into tag name → display value.
///
/// Malformed blocks yield whatever could be read before the damage.
pub fn parse_exif(raw: &[u8]) -> BTreeMap<String, String> {
    let data = raw.strip_prefix(b"Exif\0\0").unwrap_or(raw);
    let mut tags = BTreeMap::new();

    let order = match data.get(0..2) {
        Some(b"II") => ByteOrder::Little,
        Some(b"MM") => ByteOrder::Big,
        _ => return tags,
    };
    let reader = Reader { data, order };
    if reader.u16_at(2) != Some(42) {
        return tags;
    }
    let Some(ifd0) = reader.u32_at(4) else {
        return tags;
    };

    let mut pending = vec![ifd0 as usize];
    let mut visited = Vec::new();
    while let Some(offset) = pending.pop() {
        if visited.contains(&offset) {
            continue;
        }
        visited.push(offset);
        read_ifd(&reader, offset, &mut tags, &mut pending);
    }
    tags
}

fn read_ifd(
    reader: &Reader<'_>,
    offset: usize,
    tags: &mut BTreeMap<String, String>,
    pending: &mut Vec<usize>,
) {
    let Some(count) = reader.u16_at(offset) else {
        return;
    };

    for i in 0..count as usize {
        let entry = offset + 2 + i * 12;
        let (Some(tag), Some(kind), Some(n)) = (
            reader.u16_at(entry),
            reader.u16_at(entry + 2),
            reader.u32_at(entry + 4),
        ) else {
            return;
        };

        if tag == EXIF_IFD_POINTER || tag == GPS_IFD_POINTER {
            if let Some(sub) = reader.u32_at(entry + 8) {
                pending.push(sub as usize);
            }
            continue;
        }

        if let Some(value) = read_value(reader, entry, kind, n as usize) {
            tags.insert(tag_name(tag), value);
        }
    }
}

fn type_size(kind: u16) -> Option<usize> {
    match kind {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 => Some(4),
        5 | 10 => Some(8),
        _ => None,
    }
}

fn read_value(reader: &Reader<'_>, entry: usize, kind: u16, count: usize) -> Option<String> {
    let size = type_size(kind)?.checked_mul(count)?;
    let start = if size <= 4 {
        entry + 8
    } else {
        reader.u32_at(entry + 8)? as usize
    };
    let bytes = reader.data.get(start..start.checked_add(size)?)?;

    let value = match kind {
        2 => String::from_utf8_lossy(bytes)
            .trim_end_matches('\0')
            .trim()
            .to_string(),
        1 | 6 | 7 => {
            if count > MAX_VALUE_COUNT {
                format!("<{} bytes>", count)
            } else if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                String::from_utf8_lossy(bytes).to_string()
            } else {
                format!("{:?}", bytes)
            }
        }
        3 | 8 => join((0..count.min(MAX_VALUE_COUNT)).filter_map(|i| {
            reader.u16_at(start + i * 2).map(|v| {
                if kind == 8 {
                    (v as i16).to_string()
                } else {
                    v.to_string()
                }
            })
        })),
        4 | 9 => join((0..count.min(MAX_VALUE_COUNT)).filter_map(|i| {
            reader.u32_at(start + i * 4).map(|v| {
                if kind == 9 {
                    (v as i32).to_string()
                } else {
                    v.to_string()
                }
            })
        })),
        5 | 10 => join((0..count.min(MAX_VALUE_COUNT)).filter_map(|i| {
            let num = reader.u32_at(start + i * 8)?;
            let den = reader.u32_at(start + i * 8 + 4)?;
            Some(if kind == 10 {
                format!("{}/{}", num as i32, den as i32)
            } else {
                format!("{}/{}", num, den)
            })
        })),
        _ => return None,
    };
    Some(value)
}

fn join(values: impl Iterator<Item = String>) -> String {
    let values: Vec<String> = values.collect();
    if values.len() == 1 {
        values.into_iter().next().unwrap_or_default()
    } else {
        format!("({})", values.join(", "))
    }
}

fn tag_name(tag: u16) -> String {
    let name = match tag {
        0x010E => "ImageDescription",
        0x010F => "Make",
        0x0110 => "Model",
        0x0112 => "Orientation",
        0x011A => "XResolution",
        0x011B => "YResolution",
        0x0128 => "ResolutionUnit",
        0x0131 => "Software",
        0x0132 => "DateTime",
        0x013B => "Artist",
        0x0213 => "YCbCrPositioning",
        0x8298 => "Copyright",
        0x829A => "ExposureTime",
        0x829D => "FNumber",
        0x8822 => "ExposureProgram",
        0x8827 => "ISOSpeedRatings",
        0x9000 => "ExifVersion",
        0x9003 => "DateTimeOriginal",
        0x9004 => "DateTimeDigitized",
        0x9201 => "ShutterSpeedValue",
        0x9202 => "ApertureValue",
        0x9204 => "ExposureBiasValue",
        0x9207 => "MeteringMode",
        0x9209 => "Flash",
        0x920A => "FocalLength",
        0x927C => "MakerNote",
        0x9286 => "UserComment",
        0xA001 => "ColorSpace",
        0xA002 => "PixelXDimension",
        0xA003 => "PixelYDimension",
        0xA402 => "ExposureMode",
        0xA403 => "WhiteBalance",
        0xA405 => "FocalLengthIn35mmFilm",
        0xA406 => "SceneCaptureType",
        0xA433 => "LensMake",
        0xA434 => "LensModel",
        0x0000 => "GPSVersionID",
        0x0001 => "GPSLatitudeRef",
        0x0002 => "GPSLatitude",
        0x0003 => "GPSLongitudeRef",
        0x0004 => "GPSLongitude",
        0x0006 => "GPSAltitude",
        _ => return tag.to_string(),
    };
    name.to_string()
}
