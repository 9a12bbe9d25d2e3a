use thiserror::Error;

pub type Result<T> = std::result::Result<T, InjectError>;

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("no path supplied")]
    MissingPath,
    #[error("the sheet [{name}] is not included in this workbook, possible sheets: {available:?}")]
    UnknownSheet {
        name: String,
        available: Vec<String>,
    },
    #[error("sheet state is outside of the parameters (0-2 expected, {0} received)")]
    InvalidState(i64),
    #[error("invalid cell coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("invalid cell value: {0}")]
    InvalidValue(String),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error(
        "xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml error: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl From<std::string::FromUtf8Error> for InjectError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::Utf8(err.utf8_error())
    }
}

impl From<tempfile::PersistError> for InjectError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}
