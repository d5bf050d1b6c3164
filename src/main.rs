use widget_benchmark::alloc::TrackingAllocator;

mod cli;

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator;

fn main() {
    cli::run();
}
