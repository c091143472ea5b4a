use foff_composites::{BooleanEngine, CompositeLoader, CompositeStore, CompositesMap, MapSource, Metric};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let location = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "test-composites.map".to_string());
    println!("🧪 Testing composites map: {location}");

    let source = MapSource::parse(&location)?;
    let mut map = CompositesMap::new(source.location());
    source.fetch_into(&mut map).await?;
    println!("✅ Map fetched ({} bytes)", map.buffered());

    let engine = BooleanEngine::new()?;
    let mut metric = Metric::new();
    let mut store = CompositeStore::new();
    let mut loader = CompositeLoader::new(&mut store, &mut metric, &engine);
    let summary = map.finish(&mut loader);
    println!("   Loaded: {}", summary.loaded);
    println!("   Skipped: {}", summary.skipped);

    store.process_dependencies(&metric);
    for composite in store.iter() {
        println!(
            "   {} = {} (score {}, second pass: {})",
            composite.name(),
            composite.expression_text(),
            composite.score(),
            store.is_second_pass(composite.name())
        );
    }

    Ok(())
}
