use crate::utils::Workspace;
use colored::Colorize;

pub fn handle(workspace: &Workspace) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());
    workspace.print_header();

    let deployment = match workspace.assemble() {
        Ok((deployment, _)) => deployment,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let stack = &deployment.stack;
    let waves = stack.waves()?;
    let variant = &workspace.config.variant;

    println!("{}", "✓ 設定ファイルは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  ドメイン: {}", workspace.context.domain().cyan());
    println!(
        "  構成: edge={} tls={} bootstrap={} renderer={}",
        variant.edge, variant.tls, variant.bootstrap, variant.renderer
    );
    println!("  リソース: {}個 ({}段)", stack.len(), waves.len());
    for (i, wave) in waves.iter().enumerate() {
        println!("    {}: {}", i + 1, wave.join(", ").dimmed());
    }
    Ok(())
}
