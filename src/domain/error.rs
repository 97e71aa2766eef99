use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("invalid selector: must not be empty")]
    Empty,
    #[error("invalid selector: character `{character}` is not allowed")]
    InvalidCharacter { character: char },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("badly formatted cached entry: missing content-type delimiter")]
    MissingDelimiter,
    #[error("badly formatted cached entry: content-type is not valid UTF-8")]
    ContentType,
}
