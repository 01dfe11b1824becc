use crate::core::constants::{DEFAULT_MAX_ZOOM, TILE_SIZE};
use crate::core::geo::{LatLng, LatLngBounds};
use crate::prelude::Arc;
use crate::tiles::position::{tiles_per_axis, TilePosition, TileXY};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Header Bing sets on placeholder images served past the imagery's depth
pub const BING_TILE_INFO_HEADER: &str = "X-VE-Tile-Info";

/// Trait representing anything that can address tiles of a Web Mercator
/// pyramid and produce their URLs.
pub trait TileSource: Send + Sync {
    /// Cache partition name; tiles of different sources never share entries
    fn name(&self) -> &str;

    /// Build a URL for the requested tile
    fn tile_url(&self, position: TilePosition) -> String;

    fn tile_size(&self) -> u32 {
        TILE_SIZE
    }

    fn min_zoom(&self) -> u8 {
        0
    }

    fn max_zoom(&self) -> u8 {
        DEFAULT_MAX_ZOOM
    }

    /// Geographic area the source has tiles for
    fn world_bounds(&self) -> LatLngBounds {
        LatLngBounds::mercator_world()
    }

    fn attribution(&self) -> Option<String> {
        None
    }

    /// True when a response is the source's "no tile at this zoom" marker
    fn is_no_tile_response(&self, _headers: &[(String, String)]) -> bool {
        false
    }

    /// Fractional tile coordinates of a geographic position
    fn lat_lng_to_tile_xy(&self, lat_lng: &LatLng, zoom: u8) -> TileXY {
        let n = tiles_per_axis(zoom) as f64;
        let lat = LatLng::clamp_lat(lat_lng.lat).to_radians();
        let x = (lat_lng.lng + 180.0) / 360.0 * n;
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n;
        TileXY::new(x, y, zoom)
    }

    /// Geographic position of fractional tile coordinates
    fn tile_xy_to_lat_lng(&self, xy: &TileXY) -> LatLng {
        let n = tiles_per_axis(xy.zoom) as f64;
        let lng = xy.x / n * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * xy.y / n)).sinh().atan().to_degrees();
        LatLng::new(lat, lng)
    }
}

fn pick_subdomain<'a>(subdomains: &'a [String], position: &TilePosition) -> &'a str {
    if subdomains.is_empty() {
        return "";
    }
    let idx = ((position.x as u64 + position.y as u64) % subdomains.len() as u64) as usize;
    &subdomains[idx]
}

/// Slippy-map / TMS source driven by a URL template.
///
/// Recognised placeholders: `{z}` (or `{zoom}`), `{x}`, `{y}`, `{-y}` for
/// bottom-origin TMS rows, and `{s}` for a rotating subdomain.
#[derive(Debug, Clone)]
pub struct TmsSource {
    name: String,
    url_template: String,
    subdomains: Vec<String>,
    min_zoom: u8,
    max_zoom: u8,
    tile_size: u32,
    attribution: Option<String>,
}

impl TmsSource {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            subdomains: Vec::new(),
            min_zoom: 0,
            max_zoom: 19,
            tile_size: TILE_SIZE,
            attribution: None,
        }
    }

    pub fn openstreetmap() -> Self {
        Self::new("osm", "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png")
            .with_subdomains(&["a", "b", "c"])
            .with_attribution("© OpenStreetMap contributors")
    }

    pub fn with_subdomains(mut self, subdomains: &[&str]) -> Self {
        self.subdomains = subdomains.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }
}

impl TileSource for TmsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_url(&self, position: TilePosition) -> String {
        let flipped_y = tiles_per_axis(position.zoom)
            .saturating_sub(1)
            .saturating_sub(position.y);
        self.url_template
            .replace("{zoom}", &position.zoom.to_string())
            .replace("{z}", &position.zoom.to_string())
            .replace("{x}", &position.x.to_string())
            .replace("{-y}", &flipped_y.to_string())
            .replace("{y}", &position.y.to_string())
            .replace("{s}", pick_subdomain(&self.subdomains, &position))
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn attribution(&self) -> Option<String> {
        self.attribution.clone()
    }
}

/// WMTS source on a Google-compatible Web Mercator tile matrix set.
///
/// A `url` containing `{TileMatrix}` is treated as a RESTful template
/// (`{TileRow}`, `{TileCol}`, `{Layer}`, `{Style}`, `{TileMatrixSet}` are also
/// substituted); anything else is a KVP endpoint that receives a `GetTile`
/// query.
#[derive(Debug, Clone)]
pub struct WmtsSource {
    name: String,
    url: String,
    layer: String,
    style: String,
    tile_matrix_set: String,
    format: String,
    min_zoom: u8,
    max_zoom: u8,
}

impl WmtsSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        layer: impl Into<String>,
        tile_matrix_set: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            layer: layer.into(),
            style: "default".to_string(),
            tile_matrix_set: tile_matrix_set.into(),
            format: "image/png".to_string(),
            min_zoom: 0,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }
}

impl TileSource for WmtsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_url(&self, position: TilePosition) -> String {
        if self.url.contains("{TileMatrix}") {
            return self
                .url
                .replace("{TileMatrixSet}", &self.tile_matrix_set)
                .replace("{TileMatrix}", &position.zoom.to_string())
                .replace("{TileRow}", &position.y.to_string())
                .replace("{TileCol}", &position.x.to_string())
                .replace("{Layer}", &self.layer)
                .replace("{Style}", &self.style);
        }

        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}SERVICE=WMTS&REQUEST=GetTile&VERSION=1.0.0&LAYER={}&STYLE={}&FORMAT={}&TILEMATRIXSET={}&TILEMATRIX={}&TILEROW={}&TILECOL={}",
            self.url,
            separator,
            self.layer,
            self.style,
            self.format,
            self.tile_matrix_set,
            position.zoom,
            position.y,
            position.x
        )
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }
}

/// Bing Maps aerial imagery, addressed by quadkey.
///
/// Past the imagery's depth Bing answers with a placeholder image flagged by
/// the `X-VE-Tile-Info: no-tile` header; those responses mark the tile as
/// overzoomed.
#[derive(Debug, Clone)]
pub struct BingSource {
    name: String,
    url_template: String,
    subdomains: Vec<String>,
    culture: String,
    max_zoom: u8,
}

impl BingSource {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            name: "bing".to_string(),
            url_template: url_template.into(),
            subdomains: ["t0", "t1", "t2", "t3"].iter().map(|s| s.to_string()).collect(),
            culture: "en-US".to_string(),
            max_zoom: 22,
        }
    }

    pub fn aerial() -> Self {
        Self::new("https://ecn.{subdomain}.tiles.virtualearth.net/tiles/a{quadkey}.jpeg?g=587&mkt={culture}")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = culture.into();
        self
    }

    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = max_zoom;
        self
    }

    /// Quadkey of a tile: one base-4 digit per level, most significant first
    pub fn quadkey(position: &TilePosition) -> String {
        let mut key = String::with_capacity(position.zoom as usize);
        for level in (1..=position.zoom).rev() {
            let mask = 1u32 << (level - 1);
            let mut digit = b'0';
            if position.x & mask != 0 {
                digit += 1;
            }
            if position.y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }
}

impl TileSource for BingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_url(&self, position: TilePosition) -> String {
        self.url_template
            .replace("{quadkey}", &Self::quadkey(&position))
            .replace("{subdomain}", pick_subdomain(&self.subdomains, &position))
            .replace("{culture}", &self.culture)
    }

    fn min_zoom(&self) -> u8 {
        1
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn attribution(&self) -> Option<String> {
        Some("© Microsoft Corporation".to_string())
    }

    fn is_no_tile_response(&self, headers: &[(String, String)]) -> bool {
        headers.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case(BING_TILE_INFO_HEADER) && value.trim() == "no-tile"
        })
    }
}

/// Serialisable description of a tile source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TileSourceConfig {
    Tms {
        name: String,
        url: String,
        #[serde(default)]
        subdomains: Vec<String>,
        #[serde(default)]
        min_zoom: u8,
        #[serde(default = "default_tms_max_zoom")]
        max_zoom: u8,
        #[serde(default = "default_tile_size")]
        tile_size: u32,
        #[serde(default)]
        attribution: Option<String>,
    },
    Wmts {
        name: String,
        url: String,
        layer: String,
        tile_matrix_set: String,
        #[serde(default = "default_wmts_style")]
        style: String,
        #[serde(default = "default_wmts_format")]
        format: String,
        #[serde(default)]
        min_zoom: u8,
        #[serde(default = "default_max_zoom")]
        max_zoom: u8,
    },
    Bing {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        culture: Option<String>,
        #[serde(default)]
        max_zoom: Option<u8>,
    },
}

fn default_tms_max_zoom() -> u8 {
    19
}

fn default_max_zoom() -> u8 {
    DEFAULT_MAX_ZOOM
}

fn default_tile_size() -> u32 {
    TILE_SIZE
}

fn default_wmts_style() -> String {
    "default".to_string()
}

fn default_wmts_format() -> String {
    "image/png".to_string()
}

impl TileSourceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate and instantiate the described source
    pub fn build(&self) -> Result<Arc<dyn TileSource>> {
        match self {
            TileSourceConfig::Tms {
                name,
                url,
                subdomains,
                min_zoom,
                max_zoom,
                tile_size,
                attribution,
            } => {
                check_source(name, url, *min_zoom, *max_zoom)?;
                let subdomains: Vec<&str> = subdomains.iter().map(String::as_str).collect();
                let mut source = TmsSource::new(name.clone(), url.clone())
                    .with_subdomains(&subdomains)
                    .with_zoom_range(*min_zoom, *max_zoom)
                    .with_tile_size(*tile_size);
                if let Some(attribution) = attribution {
                    source = source.with_attribution(attribution.clone());
                }
                Ok(Arc::new(source))
            }
            TileSourceConfig::Wmts {
                name,
                url,
                layer,
                tile_matrix_set,
                style,
                format,
                min_zoom,
                max_zoom,
            } => {
                check_source(name, url, *min_zoom, *max_zoom)?;
                Ok(Arc::new(
                    WmtsSource::new(name.clone(), url.clone(), layer.clone(), tile_matrix_set.clone())
                        .with_style(style.clone())
                        .with_format(format.clone())
                        .with_zoom_range(*min_zoom, *max_zoom),
                ))
            }
            TileSourceConfig::Bing {
                url,
                culture,
                max_zoom,
            } => {
                let mut source = match url {
                    Some(url) => BingSource::new(url.clone()),
                    None => BingSource::aerial(),
                };
                if let Some(culture) = culture {
                    source = source.with_culture(culture.clone());
                }
                if let Some(max_zoom) = max_zoom {
                    check_source("bing", &source.url_template, 1, *max_zoom)?;
                    source = source.with_max_zoom(*max_zoom);
                }
                Ok(Arc::new(source))
            }
        }
    }
}

fn check_source(name: &str, url: &str, min_zoom: u8, max_zoom: u8) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MapError::Config("tile source name is empty".to_string()));
    }
    if url.trim().is_empty() {
        return Err(MapError::Config(format!("tile source '{}' has no url", name)));
    }
    if min_zoom > max_zoom {
        return Err(MapError::InvalidZoomBounds {
            min: min_zoom,
            max: max_zoom,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tms_template() {
        let source = TmsSource::new("test", "https://{s}.example.com/{z}/{x}/{y}.png")
            .with_subdomains(&["a", "b"]);

        assert_eq!(
            source.tile_url(TilePosition::new(3, 4, 5)),
            "https://b.example.com/5/3/4.png"
        );
    }

    #[test]
    fn test_subdomains_rotate_by_tile() {
        let subdomains: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

        assert_eq!(pick_subdomain(&subdomains, &TilePosition::new(0, 0, 3)), "a");
        assert_eq!(pick_subdomain(&subdomains, &TilePosition::new(1, 0, 3)), "b");
        assert_eq!(pick_subdomain(&subdomains, &TilePosition::new(4, 1, 3)), "c");
        assert_eq!(pick_subdomain(&[], &TilePosition::new(4, 1, 3)), "");

        let bing = BingSource::aerial();
        assert!(bing.tile_url(TilePosition::new(1, 2, 3)).starts_with("https://ecn.t3."));
    }

    #[test]
    fn test_tms_flipped_row() {
        let source = TmsSource::new("tms", "https://example.com/{zoom}/{x}/{-y}.png");
        assert_eq!(source.tile_url(TilePosition::new(1, 0, 2)), "https://example.com/2/1/3.png");
    }

    #[test]
    fn test_wmts_rest_and_kvp() {
        let rest = WmtsSource::new(
            "rest",
            "https://example.com/{Layer}/{TileMatrixSet}/{TileMatrix}/{TileRow}/{TileCol}.png",
            "ortho",
            "GoogleMapsCompatible",
        );
        assert_eq!(
            rest.tile_url(TilePosition::new(7, 9, 4)),
            "https://example.com/ortho/GoogleMapsCompatible/4/9/7.png"
        );

        let kvp = WmtsSource::new("kvp", "https://example.com/wmts", "ortho", "g");
        let url = kvp.tile_url(TilePosition::new(7, 9, 4));
        assert!(url.starts_with("https://example.com/wmts?SERVICE=WMTS"));
        assert!(url.ends_with("TILEMATRIX=4&TILEROW=9&TILECOL=7"));
    }

    #[test]
    fn test_bing_quadkey() {
        assert_eq!(BingSource::quadkey(&TilePosition::new(3, 5, 3)), "213");
        assert_eq!(BingSource::quadkey(&TilePosition::new(0, 0, 1)), "0");
    }

    #[test]
    fn test_bing_no_tile_header() {
        let source = BingSource::aerial();
        let marker = vec![("x-ve-tile-info".to_string(), "no-tile".to_string())];
        let normal = vec![("content-type".to_string(), "image/jpeg".to_string())];

        assert!(source.is_no_tile_response(&marker));
        assert!(!source.is_no_tile_response(&normal));
    }

    #[test]
    fn test_tile_xy_round_trip() {
        let source = TmsSource::openstreetmap();
        let coord = LatLng::new(52.52, 13.405);
        let xy = source.lat_lng_to_tile_xy(&coord, 12);
        let back = source.tile_xy_to_lat_lng(&xy);

        assert_eq!(xy.position(), TilePosition::new(2200, 1343, 12));
        assert!((back.lat - coord.lat).abs() < 1e-9);
        assert!((back.lng - coord.lng).abs() < 1e-9);
    }

    #[test]
    fn test_config_build() {
        let config = TileSourceConfig::from_json(
            r#"{ "type": "tms", "name": "osm", "url": "https://tile.example.com/{z}/{x}/{y}.png", "max_zoom": 8 }"#,
        )
        .unwrap();
        let source = config.build().unwrap();

        assert_eq!(source.name(), "osm");
        assert_eq!(source.max_zoom(), 8);
        assert_eq!(source.tile_size(), 256);
    }

    #[test]
    fn test_config_rejects_inverted_zoom() {
        let config = TileSourceConfig::Wmts {
            name: "w".to_string(),
            url: "https://example.com/wmts".to_string(),
            layer: "l".to_string(),
            tile_matrix_set: "g".to_string(),
            style: default_wmts_style(),
            format: default_wmts_format(),
            min_zoom: 9,
            max_zoom: 3,
        };
        assert!(matches!(config.build(), Err(MapError::InvalidZoomBounds { .. })));
    }
}
