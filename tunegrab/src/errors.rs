use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Template not found on screen: {0}")]
    TemplateNotFound(String),

    #[error("Template assets missing: {0}")]
    MissingAssets(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Catalog scrape failed: {0}")]
    ScrapeError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
