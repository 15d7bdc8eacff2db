use crate::error::SmallError;

pub type SmallResult<T = ()> = Result<T, SmallError>;
