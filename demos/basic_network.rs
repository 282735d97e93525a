// demos/basic_network.rs
use distributed_coloring::*;
use rand::thread_rng;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🚀 Randomized Distributed Coloring");
    println!("==================================");
    println!("Every node is its own task and only talks to its neighbors.\n");

    let (nodes, degree) = (300, 120);
    let source = generators::random_regular(degree, nodes, &mut thread_rng())?;
    let graph = Graph::from_source(&source)?;
    println!(
        "📋 Random {}-regular graph: {} nodes, {} edges, {} colors available",
        degree,
        graph.node_count(),
        graph.edge_count(),
        graph.palette().len()
    );

    let config = SimulationConfig::default().with_trace(TraceConfig {
        round: true,
        verify: true,
        ..TraceConfig::none()
    });
    let mut sink = LogSink;
    let coloring = color_graph_concurrent(graph.clone(), &config, &mut sink).await?;

    println!(
        "\n✨ Colored {} nodes in {} rounds using {} distinct colors",
        coloring.len(),
        coloring.rounds,
        coloring.distinct_colors()
    );
    println!("✓ Proper coloring: {}", verify(&graph, &coloring));
    Ok(())
}
