use log::{debug, info};
use std::env;
use std::fs;

use maverick::config::DecodeOptions;
use maverick::error::RomError;
use maverick::level::{LevelReader, LoadOverrides};
use maverick::palette::to_rgb888;
use maverick::rom::RomImage;
use maverick::sort;
use maverick::tiles::MapTile;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("maverick - level decoder for the SNES Mega Man X ROMs");
        println!();
        println!(
            "Usage: {} <rom.sfc> [--level N] [--point N] [--config options.toml] [--sort]",
            args[0]
        );
        println!("Examples:");
        println!("  {} roms/mmx.sfc --level 3", args[0]);
        println!("  {} roms/mmx2.sfc --level 10 --point 1 --sort", args[0]);
        println!();
        println!("--level / --point select which stage and checkpoint to decode");
        println!("--config points at a TOML file with decode options");
        println!("--sort additionally reports what the tile re-sort would save");
        return Ok(());
    }

    let rom_path = &args[1];

    let mut options = DecodeOptions::default();
    let mut level = None;
    let mut point = None;
    let mut run_sort = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--level" => {
                let value = args
                    .get(i + 1)
                    .ok_or("--level needs a number")?
                    .parse::<u16>()
                    .map_err(|_| format!("Invalid level: {}", args[i + 1]))?;
                level = Some(value);
                i += 2;
            }
            "--point" => {
                let value = args
                    .get(i + 1)
                    .ok_or("--point needs a number")?
                    .parse::<u16>()
                    .map_err(|_| format!("Invalid point: {}", args[i + 1]))?;
                point = Some(value);
                i += 2;
            }
            "--config" => {
                let path = args.get(i + 1).ok_or("--config needs a path")?;
                options = DecodeOptions::from_file(path)?;
                i += 2;
            }
            "--sort" => {
                run_sort = true;
                i += 1;
            }
            other => {
                return Err(format!("Unknown option: {}", other).into());
            }
        }
    }

    let level = level.unwrap_or(options.level);
    let point = point.unwrap_or(options.point);

    debug!("loading ROM image: {}", rom_path);
    let bytes = match fs::read(rom_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: cannot read ROM file '{}': {}", rom_path, e);
            std::process::exit(1);
        }
    };

    let rom = RomImage::load(bytes)?;
    info!(
        "{} ({:?}, {} bytes)",
        rom.header().title_string(),
        rom.mapping(),
        rom.len()
    );

    let background = options.background;
    let reader = LevelReader::with_options(rom, options)?;
    let snapshot = reader.select_level(level, point, LoadOverrides::default())?;

    println!(
        "{} level {} ({} x {} scenes, {} in use)",
        reader.variant().name(),
        level,
        snapshot.width,
        snapshot.height,
        snapshot.scene_used
    );
    println!(
        "graphics: id {:#04x}, {:#x} bytes compressed to {:#x} at rom {:#x}",
        snapshot.gfx.gfx_id, snapshot.gfx.cmp_size, snapshot.gfx.real_size, snapshot.gfx.cmp_pos
    );
    println!(
        "events: {} across {} checkpoint(s)",
        snapshot.events.len(),
        snapshot.checkpoints.len()
    );

    for (i, cp) in snapshot.checkpoints.iter().enumerate() {
        println!(
            "  checkpoint {}: spawn ({}, {}) camera ({}, {}) loads obj/tile/pal {}/{}/{}",
            i, cp.ch_x, cp.ch_y, cp.cam_x, cp.cam_y, cp.obj_load, cp.tile_load, cp.pal_load
        );
    }

    // first palette row as a quick sanity readout
    let row: Vec<String> = snapshot.palettes.colors[..16]
        .iter()
        .map(|&c| {
            let (r, g, b) = to_rgb888(c);
            format!("#{:02x}{:02x}{:02x}", r, g, b)
        })
        .collect();
    println!("palette row 0: {}", row.join(" "));

    if let Some(word) = snapshot.mapping.first() {
        let tile = MapTile::from_word(*word);
        debug!("first map word decodes to {:?}", tile);
    }

    if background {
        match reader.load_background(level)? {
            Some(plane) => println!(
                "background: {} x {} scenes, {} in use",
                plane.width, plane.height, plane.scene_used
            ),
            None => println!("background: not present for this title"),
        }
    }

    if run_sort {
        let outcome = level_sort(&reader, &snapshot)?;
        println!(
            "tile re-sort: {:#x} bytes (block was {:#x})",
            outcome.packed_size, snapshot.gfx.cmp_size
        );
    }

    Ok(())
}

fn level_sort(
    reader: &LevelReader,
    snapshot: &maverick::level::LevelSnapshot,
) -> Result<sort::SortOutcome, RomError> {
    use maverick::compress::Scheme;
    use maverick::tiles::TileMemory;

    // rebuild tile memory from the snapshot's window
    let mut mem = TileMemory::new();
    mem.load_raw_bytes(&snapshot.vram);

    sort::sort_tiles(
        &mem,
        snapshot.gfx.cmp_size,
        snapshot.dynamic_span,
        snapshot.sort_ok,
        Scheme::for_variant(reader.variant()),
    )
}
