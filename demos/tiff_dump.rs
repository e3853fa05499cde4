use tiffcore::decoder::{Decoder, ReaderSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let Some(image) = std::env::args_os().nth(1) else {
        eprintln!("Usage: tiff-dump FILE [--strict]");
        return Ok(());
    };
    let strict = std::env::args().any(|arg| arg == "--strict");

    let decoder = Decoder::new(ReaderSource::open(image)?).strict(strict);
    print!("{}", decoder.dump());

    let compliance = decoder.format_compliance()?;
    if compliance.is_compliant() {
        println!("\nno format deviations");
    }

    match decoder.decode_first_image() {
        Ok(raster) => {
            let (width, height) = raster.dimensions();
            println!(
                "decoded first image: {}x{}, {}",
                width,
                height,
                if raster.has_alpha() { "RGBA" } else { "RGB" }
            );
        }
        Err(err) => println!("first image not decodable: {}", err),
    }

    Ok(())
}
