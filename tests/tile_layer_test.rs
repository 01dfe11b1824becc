mod support;

use std::sync::Arc;
use support::*;
use tilescope::core::config::TileLayerConfig;
use tilescope::core::events::{EventBus, TileEvent};
use tilescope::layers::StatusMessage;
use tilescope::rendering::{GammaFilter, RenderContext};
use tilescope::tiles::{
    FnLoader, LoadOutcome, MemoryManager, TileManager, TileOutcome, TilePosition, TileRange, TileRequest, TileStatus,
    TmsSource,
};
use tilescope::TileLayer;

fn layer(loader: Arc<RecordingLoader>, config: TileLayerConfig) -> TileLayer {
    init_logging();
    TileLayer::new(test_source(), loader, MemoryManager::unlimited(), config).unwrap()
}

#[test]
fn test_two_by_two_view_loads_then_draws() {
    let loader = RecordingLoader::new();
    let mut layer = layer(Arc::clone(&loader), TileLayerConfig::default());
    let (_, events) = layer.bus().subscribe_channel();
    let viewport = two_by_two_view();

    let mut surface = RenderContext::new(512, 512);
    let first = layer.paint(&viewport, &mut surface);

    assert_eq!(first.fetch_zoom, 10);
    assert_eq!(first.load, Some(LoadOutcome::Submitted(4)));
    assert_eq!(loader.submitted(), 4);
    assert_eq!(surface.image_count(), 0);
    assert_eq!(first.status, None);

    assert_eq!(loader.complete_all(|_| loaded()), 4);
    assert!(layer.needs_repaint());
    let changed = events
        .try_iter()
        .filter(|event| matches!(event, TileEvent::ContentChanged { .. }))
        .count();
    assert_eq!(changed, 1);

    let mut surface = RenderContext::new(512, 512);
    let second = layer.paint(&viewport, &mut surface);

    assert_eq!(second.display_zoom, 10);
    assert_eq!(second.tiles_drawn, 4);
    assert_eq!(surface.image_count(), 4);
    assert!(surface.texts().is_empty());
    assert!(second.info.has_all_loaded());
    assert!(!layer.needs_repaint());
}

#[test]
fn test_source_max_zoom_caps_fetch_level() {
    let loader = RecordingLoader::new();
    let source = Arc::new(TmsSource::new("shallow", "https://tiles.test/{z}/{x}/{y}.png").with_zoom_range(1, 8));
    let mut layer = TileLayer::new(source, loader.clone(), MemoryManager::unlimited(), TileLayerConfig::default()).unwrap();

    let report = layer.paint(&two_by_two_view(), &mut RenderContext::new(512, 512));

    assert_eq!(layer.zoom().max_zoom(), 8);
    assert_eq!(report.best_zoom, 10);
    assert_eq!(report.fetch_zoom, 8);
    assert_eq!(loader.submitted(), 1);
    assert_eq!(loader.pending_requests()[0].key.position, TilePosition::new(128, 85, 8));
}

#[test]
fn test_oversized_view_refuses_to_load() {
    let loader = RecordingLoader::new();
    let mut layer = layer(Arc::clone(&loader), TileLayerConfig::manual_zoom());
    assert!(layer.set_zoom_level(10));

    // 25 x 25 tiles at zoom 10
    let viewport = view_on_tile(512.5, 340.5, 10, 6400.0, 6400.0);
    let mut surface = RenderContext::new(6400, 6400);
    let report = layer.paint(&viewport, &mut surface);

    assert_eq!(report.display_range.size(), 625);
    assert_eq!(report.load, Some(LoadOutcome::RejectedTooLarge));
    assert_eq!(loader.submitted(), 0);
    assert_eq!(report.status, Some(StatusMessage::ZoomInToLoad));
    assert!(surface.texts().contains(&"Zoom in to load more tiles"));
}

#[test]
fn test_manual_zoom_too_deep_asks_for_more_detail() {
    let loader = RecordingLoader::new();
    let mut layer = layer(Arc::clone(&loader), TileLayerConfig::manual_zoom());
    layer.set_zoom_level(8);

    let report = layer.paint(&two_by_two_view(), &mut RenderContext::new(512, 512));

    assert_eq!(report.fetch_zoom, 8);
    assert_eq!(report.status, Some(StatusMessage::IncreaseZoomLevel));
}

#[test]
fn test_memory_failure_disables_layer() {
    let loader = RecordingLoader::new();
    let mut layer = TileLayer::new(test_source(), loader.clone(), MemoryManager::new(1024), TileLayerConfig::default()).unwrap();

    let mut surface = RenderContext::new(512, 512);
    let report = layer.paint(&two_by_two_view(), &mut surface);

    assert!(!layer.manager().has_memory());
    assert_eq!(report.status, Some(StatusMessage::NotEnoughMemory));
    assert_eq!(surface.texts(), vec!["Not enough memory to display tiles"]);
    assert_eq!(loader.submitted(), 0);
}

#[test]
fn test_layers_share_memory_budget() {
    // 4 bytes x 256 x 256 pixels x 216 tiles for the default 1920x1080 screen
    let per_layer = 4 * 256 * 256 * 216;
    let memory = MemoryManager::new(per_layer + per_layer / 2);

    let first = TileLayer::new(test_source(), RecordingLoader::new(), memory.clone(), TileLayerConfig::default()).unwrap();
    let second = TileLayer::new(test_source(), RecordingLoader::new(), memory.clone(), TileLayerConfig::default()).unwrap();
    assert!(first.manager().has_memory());
    assert!(!second.manager().has_memory());
    assert_eq!(memory.used(), per_layer);

    drop(first);
    assert_eq!(memory.used(), 0);
    let third = TileLayer::new(test_source(), RecordingLoader::new(), memory.clone(), TileLayerConfig::default()).unwrap();
    assert!(third.manager().has_memory());
}

#[test]
fn test_filter_memo_reserves_from_shared_budget() {
    let per_layer = 4 * 256 * 256 * 216;
    let memory = MemoryManager::new(2 * per_layer);
    let mut layer = TileLayer::new(test_source(), RecordingLoader::new(), memory.clone(), TileLayerConfig::default()).unwrap();
    assert_eq!(memory.used(), per_layer);

    layer.paint(&two_by_two_view(), &mut RenderContext::new(512, 512));
    assert_eq!(memory.used(), per_layer);

    layer.filters_mut().push(GammaFilter::new(1.4));
    layer.paint(&two_by_two_view(), &mut RenderContext::new(512, 512));
    assert_eq!(memory.used(), 2 * per_layer);

    layer.filters_mut().clear();
    layer.paint(&two_by_two_view(), &mut RenderContext::new(512, 512));
    assert_eq!(memory.used(), per_layer);
}

#[test]
fn test_filters_without_memo_budget_still_draw() {
    let per_layer = 4 * 256 * 256 * 216;
    let memory = MemoryManager::new(per_layer + 4096);
    let loader = Arc::new(FnLoader::new(|_: &TileRequest| loaded()));
    let mut layer = TileLayer::new(test_source(), loader, memory.clone(), TileLayerConfig::default()).unwrap();
    layer.filters_mut().push(GammaFilter::new(1.4));

    let mut surface = RenderContext::new(512, 512);
    let report = layer.paint(&two_by_two_view(), &mut surface);

    assert_eq!(report.tiles_drawn, 4);
    assert_eq!(memory.used(), per_layer);
}

#[test]
fn test_no_tiles_message_when_source_runs_out() {
    let loader = Arc::new(FnLoader::new(|request: &TileRequest| {
        if request.key.position.zoom > 5 {
            TileOutcome::NoTileAtZoom
        } else {
            loaded()
        }
    }));
    let mut layer = TileLayer::new(test_source(), loader, MemoryManager::unlimited(), TileLayerConfig::default()).unwrap();
    let viewport = two_by_two_view();

    let first = layer.paint(&viewport, &mut RenderContext::new(512, 512));
    assert_eq!(first.status, None);

    let mut surface = RenderContext::new(512, 512);
    let second = layer.paint(&viewport, &mut surface);
    assert_eq!(second.status, Some(StatusMessage::NoTilesAtZoom));
    assert!(surface.texts().contains(&"No tiles at this zoom level"));

    for _ in 0..10 {
        layer.paint(&viewport, &mut RenderContext::new(512, 512));
    }
    let settled = layer.paint(&viewport, &mut RenderContext::new(512, 512));
    assert_eq!(layer.zoom().current_zoom(), 10);
    assert_eq!(settled.display_zoom, 5);
    assert_eq!(settled.fetch_zoom, 5);
    assert_eq!(settled.status, None);
    assert!(settled.tiles_drawn >= 1);
}

#[test]
fn test_zoom_change_cancels_and_drops_stale_results() {
    let loader = RecordingLoader::new();
    let mut layer = layer(Arc::clone(&loader), TileLayerConfig::default());
    let (_, events) = layer.bus().subscribe_channel();

    layer.paint(&two_by_two_view(), &mut RenderContext::new(512, 512));
    assert_eq!(loader.pending(), 4);

    let deeper = view_on_tile(2052.0, 1364.0, 12, 512.0, 512.0);
    let report = layer.paint(&deeper, &mut RenderContext::new(512, 512));
    assert_eq!(report.fetch_zoom, 12);
    assert_eq!(loader.cancelled(), 4);
    assert!(events
        .try_iter()
        .any(|event| event == TileEvent::JobsCancelled { count: 4 }));

    loader.complete_all(|_| loaded());
    assert_eq!(layer.manager().status_at(&TilePosition::new(512, 340, 10)), TileStatus::Missing);
    assert_eq!(layer.manager().status_at(&TilePosition::new(2051, 1363, 12)), TileStatus::Visible);
}

#[test]
fn test_failed_tiles_are_labelled_and_reloaded() {
    let loader = RecordingLoader::new();
    let mut layer = layer(Arc::clone(&loader), TileLayerConfig::default());
    let viewport = two_by_two_view();

    layer.paint(&viewport, &mut RenderContext::new(512, 512));
    loader.complete_all(|_| TileOutcome::Failed("HTTP 500".to_string()));

    let mut surface = RenderContext::new(512, 512);
    let report = layer.paint(&viewport, &mut surface);
    assert_eq!(report.info.failed, 4);
    let labels = surface.texts().iter().filter(|text| **text == "Error: HTTP 500").count();
    assert_eq!(labels, 4);

    assert_eq!(layer.reload_errors(), 4);
    assert_eq!(layer.manager().status_at(&TilePosition::new(513, 341, 10)), TileStatus::Loading);
}

#[test]
fn test_finer_tiles_cover_missing_parent() {
    let loader = Arc::new(FnLoader::new(|_: &TileRequest| loaded()));
    let mut layer = TileLayer::new(test_source(), loader, MemoryManager::unlimited(), TileLayerConfig::default()).unwrap();

    // 4 x 4 tiles at zoom 11, the children of the 2 x 2 block at zoom 10
    let fine = view_on_tile(1026.0, 682.0, 11, 1024.0, 1024.0);
    let report = layer.paint(&fine, &mut RenderContext::new(1024, 1024));
    assert_eq!(report.tiles_drawn, 16);

    layer.set_auto_load(false);
    let mut surface = RenderContext::new(512, 512);
    let report = layer.paint(&two_by_two_view(), &mut surface);

    assert_eq!(report.display_zoom, 10);
    assert_eq!(report.tiles_drawn, 0);
    assert_eq!(report.fallback_tiles, 4);
    assert_eq!(surface.image_count(), 16);
}

#[test]
fn test_inspected_tile_is_highlighted() {
    let loader = RecordingLoader::new();
    let mut layer = layer(Arc::clone(&loader), TileLayerConfig::default());
    let viewport = two_by_two_view();
    layer.paint(&viewport, &mut RenderContext::new(512, 512));

    let picked = layer.inspect_tile_at(&viewport, &tilescope::Point::new(100.0, 100.0));
    assert_eq!(picked, Some(TilePosition::new(512, 340, 10)));

    let mut surface = RenderContext::new(512, 512);
    layer.paint(&viewport, &mut surface);
    assert_eq!(surface.rect_count(), 1);
    assert!(surface.texts().contains(&"10/512/340 loading"));
}

#[test]
fn test_ensure_loaded_submits_centre_out() {
    init_logging();
    let loader = RecordingLoader::new();
    let manager = TileManager::new(
        test_source(),
        loader.clone(),
        MemoryManager::unlimited(),
        &TileLayerConfig::default(),
        EventBus::new(),
    );
    assert!(manager.allocate());

    let range = TileRange::new(300, 304, 400, 404, 10);
    assert_eq!(manager.ensure_loaded(&range, false), LoadOutcome::Submitted(25));

    let distances: Vec<u32> = loader
        .pending_requests()
        .iter()
        .map(|request| {
            let position = request.key.position;
            position.x.abs_diff(302) + position.y.abs_diff(402)
        })
        .collect();
    assert_eq!(distances.len(), 25);
    assert_eq!(loader.pending_requests()[0].key.position, TilePosition::new(302, 402, 10));
    assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", distances);
    assert_eq!(distances.last(), Some(&4));
}
