use crate::utils::{self, Workspace};
use colored::Colorize;

pub async fn handle(workspace: &Workspace) -> anyhow::Result<()> {
    workspace.print_header();
    let (deployment, _) = workspace.assemble()?;

    println!();
    println!("{}", "差分を計算中...".blue());
    let engine = workspace.connect().await?;
    let plan = engine.plan(&deployment.stack).await?;

    println!();
    utils::print_plan(&plan);
    if !plan.has_changes {
        println!("{}", "✓ 変更はありません".green());
    }
    Ok(())
}
