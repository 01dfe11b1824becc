//! Render a map view to a PNG file.
//!
//! ```text
//! cargo run --example render_png -- [lat] [lng] [zoom] [output.png]
//! ```
//!
//! Tiles come from OpenStreetMap unless `TILESCOPE_SOURCE` holds a JSON tile
//! source description such as
//! `{"type":"tms","name":"osm","url":"https://tile.openstreetmap.org/{z}/{x}/{y}.png"}`.

use std::sync::Arc;
use std::time::Duration;
use tilescope::prelude::*;
use tilescope::rendering::context::colors;

fn arg<T: std::str::FromStr>(args: &[String], index: usize, default: T) -> T {
    args.get(index).and_then(|value| value.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tilescope::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let lat = arg(&args, 0, 52.5200);
    let lng = arg(&args, 1, 13.4050);
    let zoom = arg(&args, 2, 12.0);
    let output = args.get(3).cloned().unwrap_or_else(|| "map.png".to_string());

    let source: Arc<dyn TileSource> = match std::env::var("TILESCOPE_SOURCE") {
        Ok(json) => TileSourceConfig::from_json(&json)?.build()?,
        Err(_) => Arc::new(TmsSource::openstreetmap()),
    };

    let spawner = Arc::new(TokioSpawner::current()?);
    let loader = Arc::new(AsyncTileLoader::new(
        spawner,
        Arc::clone(&source),
        TileLoaderConfig::default(),
    ));
    let config = TileLayerConfig::default()
        .with_header("User-Agent", concat!("tilescope-demo/", env!("CARGO_PKG_VERSION")));
    let mut layer = TileLayer::new(source, loader, MemoryManager::default(), config)?;
    let viewport = Viewport::for_zoom(LatLng::new(lat, lng), zoom, Point::new(1024.0, 768.0));

    // Repaint until the fetch level stops changing and nothing is in flight
    let mut frame = 0;
    let surface = loop {
        let mut surface = RasterSurface::new(1024, 768, colors::WHITE);
        let report = layer.paint(&viewport, &mut surface);
        log::info!(
            "frame {}: zoom {} drawn {} fallback {} status {:?}",
            frame,
            report.fetch_zoom,
            report.tiles_drawn,
            report.fallback_tiles,
            report.status
        );

        frame += 1;
        let idle = layer.manager().outstanding_count() == 0 && !layer.needs_repaint();
        if idle || frame >= 50 {
            break surface;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };

    surface.save(&output)?;
    if let Some(attribution) = layer.attribution() {
        println!("{}", attribution);
    }
    println!("wrote {}", output);
    Ok(())
}
