//! The user-facing callback lifecycle.

use std::error::Error;

use super::context::Context;
use crate::data::BarData;

/// Anything a callback can fail with. Engine errors raised through `?` keep
/// their concrete type and can be recovered with `downcast_ref`.
pub type CallbackError = Box<dyn Error + Send + Sync + 'static>;

pub type CallbackResult = Result<(), CallbackError>;

/// An algorithm driven by the simulation loop.
///
/// `initialize` runs once before the first tick. `before_trading_start` runs
/// on the first tick of each session, ahead of that tick's `handle_data`.
pub trait Algorithm {
    fn initialize(&mut self, context: &mut Context) -> CallbackResult;

    fn before_trading_start(&mut self, _context: &mut Context, _data: &BarData<'_>) -> CallbackResult {
        Ok(())
    }

    fn handle_data(&mut self, context: &mut Context, data: &BarData<'_>) -> CallbackResult;
}

impl<A: Algorithm + ?Sized> Algorithm for Box<A> {
    fn initialize(&mut self, context: &mut Context) -> CallbackResult {
        (**self).initialize(context)
    }

    fn before_trading_start(&mut self, context: &mut Context, data: &BarData<'_>) -> CallbackResult {
        (**self).before_trading_start(context, data)
    }

    fn handle_data(&mut self, context: &mut Context, data: &BarData<'_>) -> CallbackResult {
        (**self).handle_data(context, data)
    }
}

/// An algorithm assembled from a pair of closures.
pub struct FnAlgorithm<I, H> {
    initialize: I,
    handle_data: H,
}

impl<I, H> FnAlgorithm<I, H>
where
    I: FnMut(&mut Context) -> CallbackResult,
    H: FnMut(&mut Context, &BarData<'_>) -> CallbackResult,
{
    pub fn new(initialize: I, handle_data: H) -> Self {
        Self {
            initialize,
            handle_data,
        }
    }
}

impl<I, H> Algorithm for FnAlgorithm<I, H>
where
    I: FnMut(&mut Context) -> CallbackResult,
    H: FnMut(&mut Context, &BarData<'_>) -> CallbackResult,
{
    fn initialize(&mut self, context: &mut Context) -> CallbackResult {
        (self.initialize)(context)
    }

    fn handle_data(&mut self, context: &mut Context, data: &BarData<'_>) -> CallbackResult {
        (self.handle_data)(context, data)
    }
}
