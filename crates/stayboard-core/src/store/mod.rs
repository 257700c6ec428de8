// ── Reactive storage ──

mod collection;

pub use collection::ReactiveCollection;
