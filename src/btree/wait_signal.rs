use crate::error::SmallError;

/// "This would have blocked." Raised when a NOWAIT latch request in the
/// middle of a latch walk is refused; the receiver gives up every latch it
/// holds and takes the WAIT path instead. Never leaves the btree module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaitSignal;

#[derive(Debug)]
pub(crate) enum Interrupt {
    Wait(WaitSignal),
    Fail(SmallError),
}

impl From<SmallError> for Interrupt {
    fn from(e: SmallError) -> Self {
        Interrupt::Fail(e)
    }
}

impl From<WaitSignal> for Interrupt {
    fn from(s: WaitSignal) -> Self {
        Interrupt::Wait(s)
    }
}

pub(crate) type InterruptResult<T> = Result<T, Interrupt>;
