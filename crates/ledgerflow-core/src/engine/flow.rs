//! Contrato de un flow y adaptador para closures.

use std::marker::PhantomData;

use serde_json::Value;

use crate::engine::FlowCtx;
use crate::signal::FlowResult;

/// Procedimiento durable escrito por el autor.
///
/// `run` se re-ejecuta desde el principio en cada invocación; debe llamar a
/// los mismos steps, con los mismos nombres y en el mismo orden, dado el
/// mismo input y los mismos valores ya completados.
pub trait Flow<C>: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, ctx: &mut FlowCtx<'_, C>, input: &Value) -> FlowResult<Value>;
}

/// Flow construido a partir de una closure (ver `flow_fn`).
pub struct FnFlow<C, F> {
    name: String,
    body: F,
    _conn: PhantomData<fn(&mut C)>,
}

impl<C, F> Flow<C> for FnFlow<C, F>
    where F: Fn(&mut FlowCtx<'_, C>, &Value) -> FlowResult<Value> + Send + Sync
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut FlowCtx<'_, C>, input: &Value) -> FlowResult<Value> {
        (self.body)(ctx, input)
    }
}

/// Crea un flow a partir de una closure.
///
/// ```ignore
/// let flow = flow_fn("greet", |ctx, input| {
///     let name: String = ctx.step("load", |_s| Ok::<_, String>("ada".to_string()))?;
///     Ok(json!({ "hello": name }))
/// });
/// ```
pub fn flow_fn<C, F>(name: impl Into<String>, body: F) -> FnFlow<C, F>
    where F: Fn(&mut FlowCtx<'_, C>, &Value) -> FlowResult<Value> + Send + Sync
{
    FnFlow { name: name.into(),
             body,
             _conn: PhantomData }
}
