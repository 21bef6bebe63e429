use crate::utils::Workspace;

/// 起動スクリプトを表示
///
/// データベースのエンドポイントは作成後に決まるため、トークンのまま表示されます。
pub fn handle(workspace: &Workspace, show_secrets: bool) -> anyhow::Result<()> {
    let (deployment, _) = workspace.assemble()?;

    if show_secrets {
        print!("{}", deployment.script.render());
    } else {
        print!("{}", deployment.masked_script());
    }
    Ok(())
}
