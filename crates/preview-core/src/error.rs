use thiserror::Error;

/// Stable, closed enumeration of render/storage failure codes.
///
/// Each variant's [`ErrorCode::code`] is the short alphanumeric identifier
/// exposed verbatim through the admin errors surface and through
/// `status=failed:<code>` on a [`crate::GeneratedAsset`]. The identifier is
/// also the `Display`/`FromStr` wire form, so it round-trips through the
/// storage layer unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[error("something wasn't implemented")]
    NotImplemented,
    #[error("the source asset has expired")]
    SourceAssetExpired,
    #[error("no renderers support the given file type")]
    NoRenderersSupportFileType,
    #[error("the file is too large")]
    FileTooLarge,
    #[error("no download urls work")]
    NoDownloadUrlsWork,
    #[error("too little work requested")]
    TooLittleWorkRequested,
    #[error("something mysterious happened")]
    UnknownError,
    #[error("no generated assets for the id are found")]
    UnableToFindGeneratedAssetsById,
    #[error("no generated assets for the id are found")]
    NoGeneratedAssetsFoundForId,
    #[error("no source assets for the id are found")]
    UnableToFindSourceAssetsById,
    #[error("no source assets for the id are found")]
    NoSourceAssetsFoundForId,
    #[error("no templates for the id are found")]
    UnableToFindTemplatesById,
    #[error("no templates for the id are found")]
    NoTemplatesFoundForId,
    #[error("could not determine the size of the render")]
    CouldNotDetermineRenderSize,
    #[error("could not resize image")]
    CouldNotResizeImage,
    #[error("could not upload asset")]
    CouldNotUploadAsset,
    #[error("could not determine size of file")]
    CouldNotDetermineFileSize,
    #[error("no templates for the id are found")]
    NoTemplateForId,
    #[error("template is missing required height attribute")]
    TemplateHeightAttributeMissing,
    #[error("generated asset could not be updated")]
    GeneratedAssetCouldNotBeUpdated,
    #[error("uploader does not support protocol")]
    UploaderDoesNotSupportUrl,
    #[error("invalid file id")]
    InvalidFileId,
    #[error("missing type field")]
    MissingFieldType,
    #[error("missing url field")]
    MissingFieldUrl,
    #[error("missing size field")]
    MissingFieldSize,
    #[error("could not determine type of file")]
    CouldNotDetermineFileType,
}

impl ErrorCode {
    /// All variants, for `/admin/errors`-style introspection.
    pub const ALL: &'static [Self] = &[
        Self::NotImplemented,
        Self::SourceAssetExpired,
        Self::NoRenderersSupportFileType,
        Self::FileTooLarge,
        Self::NoDownloadUrlsWork,
        Self::TooLittleWorkRequested,
        Self::UnknownError,
        Self::UnableToFindGeneratedAssetsById,
        Self::NoGeneratedAssetsFoundForId,
        Self::UnableToFindSourceAssetsById,
        Self::NoSourceAssetsFoundForId,
        Self::UnableToFindTemplatesById,
        Self::NoTemplatesFoundForId,
        Self::CouldNotDetermineRenderSize,
        Self::CouldNotResizeImage,
        Self::CouldNotUploadAsset,
        Self::CouldNotDetermineFileSize,
        Self::NoTemplateForId,
        Self::TemplateHeightAttributeMissing,
        Self::GeneratedAssetCouldNotBeUpdated,
        Self::UploaderDoesNotSupportUrl,
        Self::InvalidFileId,
        Self::MissingFieldType,
        Self::MissingFieldUrl,
        Self::MissingFieldSize,
        Self::CouldNotDetermineFileType,
    ];

    /// Stable short code, e.g. `"CouldNotResizeImage"`. This is the wire form
    /// stored after the colon in `status=failed:<code>`.
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::SourceAssetExpired => "SourceAssetExpired",
            Self::NoRenderersSupportFileType => "NoRenderersSupportFileType",
            Self::FileTooLarge => "FileTooLarge",
            Self::NoDownloadUrlsWork => "NoDownloadUrlsWork",
            Self::TooLittleWorkRequested => "TooLittleWorkRequested",
            Self::UnknownError => "UnknownError",
            Self::UnableToFindGeneratedAssetsById => "UnableToFindGeneratedAssetsById",
            Self::NoGeneratedAssetsFoundForId => "NoGeneratedAssetsFoundForId",
            Self::UnableToFindSourceAssetsById => "UnableToFindSourceAssetsById",
            Self::NoSourceAssetsFoundForId => "NoSourceAssetsFoundForId",
            Self::UnableToFindTemplatesById => "UnableToFindTemplatesById",
            Self::NoTemplatesFoundForId => "NoTemplatesFoundForId",
            Self::CouldNotDetermineRenderSize => "CouldNotDetermineRenderSize",
            Self::CouldNotResizeImage => "CouldNotResizeImage",
            Self::CouldNotUploadAsset => "CouldNotUploadAsset",
            Self::CouldNotDetermineFileSize => "CouldNotDetermineFileSize",
            Self::NoTemplateForId => "NoTemplateForId",
            Self::TemplateHeightAttributeMissing => "TemplateHeightAttributeMissing",
            Self::GeneratedAssetCouldNotBeUpdated => "GeneratedAssetCouldNotBeUpdated",
            Self::UploaderDoesNotSupportUrl => "UploaderDoesNotSupportUrl",
            Self::InvalidFileId => "InvalidFileId",
            Self::MissingFieldType => "MissingFieldType",
            Self::MissingFieldUrl => "MissingFieldUrl",
            Self::MissingFieldSize => "MissingFieldSize",
            Self::CouldNotDetermineFileType => "CouldNotDetermineFileType",
        }
    }

    /// Parse a wire-form code back into its variant. Used when deserializing
    /// `status=failed:<code>` from storage.
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Unified error type for preview-core and its collaborator crates.
///
/// This wraps [`ErrorCode`] (terminal render/storage failures that get
/// written back as `failed:<code>`) plus the transport/I/O errors that can
/// occur while the core is doing its own bookkeeping.
#[derive(Error, Debug)]
pub enum Error {
    /// A closed, stable render/storage failure code.
    #[error("{0}")]
    Code(#[from] ErrorCode),

    /// Storage backend failure (sled, in-memory invariant violation, etc).
    #[error("storage error: {0}")]
    Storage(String),

    /// Attribute bag (de)serialization failure.
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration load/parse failure.
    #[error("failed to load config: {0}")]
    ConfigLoad(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
