//! Human readable listing of a resolved stream.

use std::fmt;

use crate::contents::Contents;
use crate::info::{self, ImageInfo};
use crate::tags::ByteOrder;

/// Lists the header, the derived image info, every field of every directory and the recorded
/// deviations.
///
/// Problems are written into the listing; this never fails.
pub fn dump(contents: &Contents) -> String {
    Listing(contents).to_string()
}

struct Listing<'a>(&'a Contents);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let contents = self.0;
        let header = &contents.header;
        let byte_order = match header.byte_order {
            ByteOrder::LittleEndian => "little endian",
            ByteOrder::BigEndian => "big endian",
        };
        writeln!(
            f,
            "{}, {}{}, first IFD at {:#x}",
            contents.format_version(),
            byte_order,
            if header.bigtiff { ", BigTIFF" } else { "" },
            header.first_ifd
        )?;

        match info::image_info(contents) {
            Ok(info) => write_info(f, &info)?,
            Err(err) => writeln!(f, "image info: <unreadable: {}>", err)?,
        }

        for directory in &contents.directories {
            write!(
                f,
                "\nDirectory {} at {:#x}, {} entries, next: ",
                directory.index(),
                directory.offset(),
                directory.len()
            )?;
            match directory.next_ifd() {
                Some(next) => writeln!(f, "{:#x}", next)?,
                None => writeln!(f, "none")?,
            }
            for field in directory.entries() {
                writeln!(f, "{}: {}", directory.index(), field)?;
            }
        }

        if !contents.compliance.is_compliant() {
            writeln!(f, "\nDeviations:")?;
            for deviation in contents.compliance.deviations() {
                writeln!(f, "  {}", deviation)?;
            }
        }
        Ok(())
    }
}

fn write_info(f: &mut fmt::Formatter<'_>, info: &ImageInfo) -> fmt::Result {
    writeln!(f, "{} ({})", info.format_details, info.mime_type)?;
    writeln!(
        f,
        "  {} x {} pixels, {} bits per pixel, {} image(s)",
        info.width, info.height, info.bits_per_pixel, info.number_of_images
    )?;
    writeln!(f, "  compression: {}", info.compression_algorithm)?;
    if let (Some(x), Some(y)) = (info.physical_width_dpi, info.physical_height_dpi) {
        writeln!(f, "  resolution: {} x {} dpi", x, y)?;
    }
    if let (Some(w), Some(h)) = (info.physical_width_inch, info.physical_height_inch) {
        writeln!(f, "  physical size: {:.3} x {:.3} in", w, h)?;
    }
    writeln!(
        f,
        "  palette: {}, transparent: {}",
        info.uses_palette, info.is_transparent
    )
}
