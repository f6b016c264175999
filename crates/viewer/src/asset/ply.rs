//! PLY point clouds and meshes: `ascii`, `binary_little_endian`,
//! `binary_big_endian`.
//!
//! Vertex `x y z` are required. Colors come from `red green blue` or, for
//! Gaussian-splatting exports, from the DC spherical-harmonic terms
//! `f_dc_0..2`. A `face` element with a vertex index list makes the result a
//! triangle mesh.

use glam::Vec3;

use super::{ExternalBuffers, Geometry};
use crate::error::LoadError;

/// Zeroth-order spherical harmonic constant
const SH_C0: f32 = 0.282_094_8;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Encoding {
    Ascii,
    BinaryLe,
    BinaryBe,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Scalar {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl Scalar {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "char" | "int8" => Some(Scalar::I8),
            "uchar" | "uint8" => Some(Scalar::U8),
            "short" | "int16" => Some(Scalar::I16),
            "ushort" | "uint16" => Some(Scalar::U16),
            "int" | "int32" => Some(Scalar::I32),
            "uint" | "uint32" => Some(Scalar::U32),
            "float" | "float32" => Some(Scalar::F32),
            "double" | "float64" => Some(Scalar::F64),
            _ => None,
        }
    }

    /// Divisor that maps an integer color channel to [0, 1]
    fn color_range(&self) -> f32 {
        match self {
            Scalar::U8 | Scalar::I8 => 255.0,
            Scalar::U16 | Scalar::I16 => 65535.0,
            Scalar::U32 | Scalar::I32 => u32::MAX as f32,
            Scalar::F32 | Scalar::F64 => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
enum Property {
    Scalar { name: String, ty: Scalar },
    List { name: String, count: Scalar, item: Scalar },
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

#[derive(Debug)]
struct Header {
    encoding: Encoding,
    elements: Vec<Element>,
    body_offset: usize,
}

pub(super) fn decode(bytes: &[u8], _external: &ExternalBuffers) -> Result<Geometry, LoadError> {
    let header = parse_header(bytes)?;
    let body = &bytes[header.body_offset..];
    let mut reader: Box<dyn ValueReader + '_> = match header.encoding {
        Encoding::Ascii => {
            let text = std::str::from_utf8(body)
                .map_err(|_| LoadError::malformed("ASCII PLY body is not valid UTF-8"))?;
            Box::new(AsciiReader {
                tokens: text.split_ascii_whitespace(),
            })
        }
        Encoding::BinaryLe => Box::new(BinaryReader {
            bytes: body,
            pos: 0,
            big_endian: false,
        }),
        Encoding::BinaryBe => Box::new(BinaryReader {
            bytes: body,
            pos: 0,
            big_endian: true,
        }),
    };

    let mut positions: Vec<Vec3> = Vec::new();
    let mut colors: Vec<[f32; 3]> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut saw_vertex = false;

    for element in &header.elements {
        match element.name.as_str() {
            "vertex" => {
                saw_vertex = true;
                read_vertices(reader.as_mut(), element, &mut positions, &mut colors)?;
            }
            "face" => read_faces(reader.as_mut(), element, &mut indices)?,
            _ => skip_element(reader.as_mut(), element)?,
        }
    }

    if !saw_vertex {
        return Err(LoadError::malformed("PLY has no vertex element"));
    }

    if indices.is_empty() {
        Ok(Geometry::points(positions, colors))
    } else {
        Ok(Geometry::triangles(positions, colors, indices))
    }
}

fn parse_header(bytes: &[u8]) -> Result<Header, LoadError> {
    const END: &[u8] = b"end_header";
    let end = bytes
        .windows(END.len())
        .position(|w| w == END)
        .ok_or_else(|| LoadError::malformed("PLY header has no end_header"))?;
    let newline = bytes[end..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| end + p + 1)
        .unwrap_or(bytes.len());

    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|_| LoadError::malformed("PLY header is not valid UTF-8"))?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    if lines.next() != Some("ply") {
        return Err(LoadError::malformed("missing 'ply' magic"));
    }

    let mut encoding = None;
    let mut elements: Vec<Element> = Vec::new();

    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["format", fmt, _version] => {
                encoding = Some(match *fmt {
                    "ascii" => Encoding::Ascii,
                    "binary_little_endian" => Encoding::BinaryLe,
                    "binary_big_endian" => Encoding::BinaryBe,
                    other => {
                        return Err(LoadError::malformed(format!("unknown PLY format '{other}'")))
                    }
                });
            }
            ["comment", ..] | ["obj_info", ..] => {}
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| LoadError::malformed(format!("bad element count '{count}'")))?;
                elements.push(Element {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count_ty, item_ty, name] => {
                let property = Property::List {
                    name: name.to_string(),
                    count: scalar(count_ty)?,
                    item: scalar(item_ty)?,
                };
                current(&mut elements)?.properties.push(property);
            }
            ["property", ty, name] => {
                let property = Property::Scalar {
                    name: name.to_string(),
                    ty: scalar(ty)?,
                };
                current(&mut elements)?.properties.push(property);
            }
            _ => return Err(LoadError::malformed(format!("unexpected PLY header line '{line}'"))),
        }
    }

    Ok(Header {
        encoding: encoding.ok_or_else(|| LoadError::malformed("PLY header has no format line"))?,
        elements,
        body_offset: newline,
    })
}

fn scalar(name: &str) -> Result<Scalar, LoadError> {
    Scalar::parse(name).ok_or_else(|| LoadError::malformed(format!("unknown PLY type '{name}'")))
}

fn current(elements: &mut [Element]) -> Result<&mut Element, LoadError> {
    elements
        .last_mut()
        .ok_or_else(|| LoadError::malformed("PLY property before any element"))
}

#[derive(Default)]
struct VertexLayout {
    xyz: [Option<usize>; 3],
    rgb: [Option<(usize, Scalar)>; 3],
    sh_dc: [Option<usize>; 3],
}

fn read_vertices(
    reader: &mut dyn ValueReader,
    element: &Element,
    positions: &mut Vec<Vec3>,
    colors: &mut Vec<[f32; 3]>,
) -> Result<(), LoadError> {
    let mut layout = VertexLayout::default();
    for (i, prop) in element.properties.iter().enumerate() {
        if let Property::Scalar { name, ty } = prop {
            match name.as_str() {
                "x" => layout.xyz[0] = Some(i),
                "y" => layout.xyz[1] = Some(i),
                "z" => layout.xyz[2] = Some(i),
                "red" | "r" | "diffuse_red" => layout.rgb[0] = Some((i, *ty)),
                "green" | "g" | "diffuse_green" => layout.rgb[1] = Some((i, *ty)),
                "blue" | "b" | "diffuse_blue" => layout.rgb[2] = Some((i, *ty)),
                "f_dc_0" => layout.sh_dc[0] = Some(i),
                "f_dc_1" => layout.sh_dc[1] = Some(i),
                "f_dc_2" => layout.sh_dc[2] = Some(i),
                _ => {}
            }
        }
    }
    let [Some(xi), Some(yi), Some(zi)] = layout.xyz else {
        return Err(LoadError::malformed("PLY vertex element lacks x/y/z"));
    };
    let has_rgb = layout.rgb.iter().all(Option::is_some);
    let has_sh = layout.sh_dc.iter().all(Option::is_some);

    // A header can claim more rows than the body holds; cap the reservation
    positions.reserve(element.count.min(1 << 20));
    let mut row = vec![0.0_f64; element.properties.len()];

    for _ in 0..element.count {
        for (i, prop) in element.properties.iter().enumerate() {
            row[i] = match prop {
                Property::Scalar { ty, .. } => reader.read(*ty)?,
                Property::List { count, item, .. } => {
                    let n = reader.read(*count)? as usize;
                    for _ in 0..n {
                        reader.read(*item)?;
                    }
                    0.0
                }
            };
        }

        positions.push(Vec3::new(row[xi] as f32, row[yi] as f32, row[zi] as f32));

        if has_rgb {
            let mut c = [0.0_f32; 3];
            for (ch, slot) in layout.rgb.iter().enumerate() {
                if let Some((i, ty)) = slot {
                    c[ch] = (row[*i] as f32 / ty.color_range()).clamp(0.0, 1.0);
                }
            }
            colors.push(c);
        } else if has_sh {
            let mut c = [0.0_f32; 3];
            for (ch, slot) in layout.sh_dc.iter().enumerate() {
                if let Some(i) = slot {
                    c[ch] = (0.5 + SH_C0 * row[*i] as f32).clamp(0.0, 1.0);
                }
            }
            colors.push(c);
        }
    }

    Ok(())
}

fn read_faces(
    reader: &mut dyn ValueReader,
    element: &Element,
    indices: &mut Vec<u32>,
) -> Result<(), LoadError> {
    let mut polygon: Vec<u32> = Vec::with_capacity(4);
    for _ in 0..element.count {
        for prop in &element.properties {
            match prop {
                Property::List { name, count, item }
                    if name == "vertex_indices" || name == "vertex_index" =>
                {
                    let n = reader.read(*count)? as usize;
                    polygon.clear();
                    for _ in 0..n {
                        let v = reader.read(*item)?;
                        if v < 0.0 {
                            return Err(LoadError::malformed("negative PLY face index"));
                        }
                        polygon.push(v as u32);
                    }
                    for k in 1..polygon.len().saturating_sub(1) {
                        indices.extend_from_slice(&[polygon[0], polygon[k], polygon[k + 1]]);
                    }
                }
                Property::List { count, item, .. } => {
                    let n = reader.read(*count)? as usize;
                    for _ in 0..n {
                        reader.read(*item)?;
                    }
                }
                Property::Scalar { ty, .. } => {
                    reader.read(*ty)?;
                }
            }
        }
    }
    Ok(())
}

fn skip_element(reader: &mut dyn ValueReader, element: &Element) -> Result<(), LoadError> {
    for _ in 0..element.count {
        for prop in &element.properties {
            match prop {
                Property::Scalar { ty, .. } => {
                    reader.read(*ty)?;
                }
                Property::List { count, item, .. } => {
                    let n = reader.read(*count)? as usize;
                    for _ in 0..n {
                        reader.read(*item)?;
                    }
                }
            }
        }
    }
    Ok(())
}

trait ValueReader {
    fn read(&mut self, ty: Scalar) -> Result<f64, LoadError>;
}

struct AsciiReader<'a> {
    tokens: std::str::SplitAsciiWhitespace<'a>,
}

impl ValueReader for AsciiReader<'_> {
    fn read(&mut self, _ty: Scalar) -> Result<f64, LoadError> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| LoadError::malformed("PLY body ended early"))?;
        token
            .parse::<f64>()
            .map_err(|_| LoadError::malformed(format!("bad PLY value '{token}'")))
    }
}

struct BinaryReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl BinaryReader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], LoadError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| LoadError::malformed("PLY body ended early"))?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        if self.big_endian {
            buf.reverse();
        }
        self.pos = end;
        Ok(buf)
    }
}

impl ValueReader for BinaryReader<'_> {
    fn read(&mut self, ty: Scalar) -> Result<f64, LoadError> {
        // Bytes are normalized to little-endian by `take`
        Ok(match ty {
            Scalar::I8 => i8::from_le_bytes(self.take::<1>()?) as f64,
            Scalar::U8 => u8::from_le_bytes(self.take::<1>()?) as f64,
            Scalar::I16 => i16::from_le_bytes(self.take::<2>()?) as f64,
            Scalar::U16 => u16::from_le_bytes(self.take::<2>()?) as f64,
            Scalar::I32 => i32::from_le_bytes(self.take::<4>()?) as f64,
            Scalar::U32 => u32::from_le_bytes(self.take::<4>()?) as f64,
            Scalar::F32 => f32::from_le_bytes(self.take::<4>()?) as f64,
            Scalar::F64 => f64::from_le_bytes(self.take::<8>()?),
        })
    }
}
