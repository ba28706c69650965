/// Emit an event that conforms to a flat event structure type using the [tracing::event!](https://github.com/tokio-rs/tracing/blob/908cc432a5994f6e17c8f36e13c217dc40085704/tracing/src/macros.rs#L854) macro.
///
/// There should be a [Subscriber](https://docs.rs/tracing/latest/tracing/trait.Subscriber.html) in the application root to check the
/// [Metadata::name](https://docs.rs/tracing/latest/tracing/struct.Metadata.html#method.name) of the event in the
/// [Event::metadata](https://docs.rs/tracing/latest/tracing/struct.Event.html#method.metadata).
///
/// The emitted [tracing::Event] will contain the name of the event twice:
/// in the [tracing::metadata::Metadata::name] field as `"event::<name>"` and under the `event` key in the [tracing::field::ValueSet].
/// This lets a subscriber either filter on `name`, or find all events by matching the `event::` prefix.
///
/// ### Example
///
/// ```ignore
/// pub struct ElectionConfirmed<'a> {
///     pub root: &'a str,
///     pub winner: &'a str,
/// }
///
/// emit!(ElectionConfirmed {
///     root: "abc",
///     winner: "def",
/// });
/// ```
#[macro_export]
macro_rules! emit {
    ($lvl:ident, $event:ident { $($field:ident $(: $value:expr)?),* $(,)? } ) => {{
        // Make sure the emitted fields match the schema of the event.
        if false {
            let _event = $event {
                $($field $(: $value)?),*
            };
        }
        tracing::event!(
            name: concat!("event::", stringify!($event)),
            tracing::Level::$lvl,
            { event = tracing::field::display(stringify!($event)), $($field $(= $value)?),* }
        )
    }};

    ($event:ident { $($field:ident $(: $value:expr)?),* $(,)? } ) => {{
        emit!(INFO, $event { $($field $(: $value)? ),* })
    }};
}
