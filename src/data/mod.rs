/// Data layer: grid types, file IO, cropping and zone resolution.
///
/// Architecture:
/// ```text
///  ndvi_2005_129.tif ...        zones.geojson | zones.tif
///        │                             │
///        ▼                             ▼
///   ┌──────────┐                ┌──────────┐
///   │  loader   │ → RasterStack  │  zones    │ → ZoneRaster
///   └──────────┘                └──────────┘
///        │                             │
///        ▼                             │
///   ┌──────────┐                       │
///   │   crop    │  region of interest ◄┘
///   └──────────┘
///        │
///        ▼
///   analysis::*  ──►  writer (GeoTIFF, PNG) / table (CSV, Parquet)
/// ```

pub mod crop;
pub mod dates;
pub mod error;
pub mod filter;
pub mod loader;
pub mod model;
pub mod table;
pub mod writer;
pub mod zones;

pub use error::RasterError;
