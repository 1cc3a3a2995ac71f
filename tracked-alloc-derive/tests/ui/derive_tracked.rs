use tracked_alloc::Handle;
use tracked_alloc_derive::Tracked;

#[derive(Tracked)]
struct Counter {
    value: u32,
}

fn main() {
    let counter = Handle::new(Counter { value: 5 });
    let copy = counter.clone();
    assert_eq!(copy.value, 5);
    assert_eq!(Handle::<Counter>::registry_size(), 1);
}
