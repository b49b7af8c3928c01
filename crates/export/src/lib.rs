mod batch;
mod crop;

pub use batch::{
    archive_file_name, export_all, export_page, page_file_name, EncodedPage, NullSink,
    ProgressSink, ZipArtifact,
};
pub use crop::crop_to_png;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("crop region maps to an empty pixel rectangle")]
    EmptyCropRegion,
    #[error("raster buffer size does not match its dimensions")]
    MalformedRaster,
    #[error("raster error: {0}")]
    Raster(#[from] labelsnap_raster::RasterError),
    #[error("image encode error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
