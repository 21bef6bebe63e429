//! デプロイの組み立て
//!
//! プロビジョナーを依存順（ネットワーク → キーペア → エッジ識別 → データベース
//! → コンピュート → エッジルーティング）に呼び出し、1つのスタックにまとめます。

use crate::bootstrap::{BootstrapParams, BootstrapScript, build_bootstrap_script, renderer_for};
use crate::compute::{LaunchRequest, launch_pool};
use crate::context::DeploymentContext;
use crate::database::{DatabaseCredentials, provision_database};
use crate::edge::EdgeIdentity;
use crate::error::Result;
use crate::keypair::provision_key_pair;
use crate::model::DeploymentConfig;
use crate::network::provision_network;
use crate::secret::Secret;
use crate::stack::{Stack, Synthesis};
use crate::token::{self, AttrRef};
use std::collections::BTreeMap;
use tracing::info;

/// 表示用の組み立てでパスワードの代わりに使う値
///
/// 英数字だけなので、PHP・sed・シェルのどのエスケープを通っても形が変わりません。
const SECRET_MARKER: &str = "WEBSTACKSECRETREDACTED";

/// 組み立て済みのデプロイ
#[derive(Debug)]
pub struct Deployment {
    pub stack: Stack,
    pub script: BootstrapScript,
    /// 出力値（属性トークンを含むことがある）
    pub outputs: BTreeMap<String, String>,
    /// パスワードを目印に差し替えて組み立てたもの
    masked: Assembly,
}

impl Deployment {
    /// 秘密情報を伏せた合成結果
    pub fn synthesize(&self) -> Synthesis {
        let mut synth = self.masked.stack.synthesize();
        synth.redact(SECRET_MARKER);
        synth
    }

    /// パスワードを伏せた起動スクリプト
    pub fn masked_script(&self) -> String {
        self.masked
            .script
            .render()
            .replace(SECRET_MARKER, crate::secret::REDACTED)
    }

    /// 出力値のトークンを解決
    ///
    /// 解決できない値はトークンのまま残します。
    pub fn resolve_outputs<F>(&self, lookup: F) -> BTreeMap<String, String>
    where
        F: Fn(&AttrRef) -> Option<String>,
    {
        self.outputs
            .iter()
            .map(|(name, value)| {
                let resolved = token::resolve_str(value, &lookup).unwrap_or_else(|_| value.clone());
                (name.clone(), resolved)
            })
            .collect()
    }
}

/// 構成からスタックを組み立てて検証する
///
/// 宣言エラーはここで返り、プロバイダーは一切呼ばれません。
/// 差分検出用のフィンガープリントはパスワードを目印に差し替えた宣言から
/// 計算するため、ステートからパスワードを推測することはできません。
/// その代わりパスワードだけの変更は計画に現れません。
pub fn assemble(
    ctx: &DeploymentContext,
    config: &DeploymentConfig,
    credentials: &DatabaseCredentials,
) -> Result<Deployment> {
    let real = build(ctx, config, credentials)?;
    let masked_credentials = DatabaseCredentials::new(
        credentials.username.clone(),
        Secret::new(SECRET_MARKER),
    );
    let masked = build(ctx, config, &masked_credentials)?;

    let mut stack = real.stack;
    stack.adopt_fingerprints(&masked.stack);

    info!(
        stack = %stack.name(),
        resources = stack.len(),
        edge = %config.variant.edge,
        tls = %config.variant.tls,
        "Assembled deployment"
    );

    Ok(Deployment {
        stack,
        script: real.script,
        outputs: real.outputs,
        masked,
    })
}

/// 1回分の組み立て結果
#[derive(Debug)]
struct Assembly {
    stack: Stack,
    script: BootstrapScript,
    outputs: BTreeMap<String, String>,
}

fn build(
    ctx: &DeploymentContext,
    config: &DeploymentConfig,
    credentials: &DatabaseCredentials,
) -> Result<Assembly> {
    let variant = config.variant;
    variant.validate()?;

    let mut stack = Stack::new(ctx.stack_name());

    let net = provision_network(&mut stack, ctx, &config.network)?;
    let key = provision_key_pair(&mut stack, ctx, config.key_pair.as_deref())?;
    let identity = EdgeIdentity::provision(&mut stack, ctx, variant.tls)?;
    let database = provision_database(
        &mut stack,
        ctx,
        &net.network,
        &config.database,
        credentials,
    )?;

    let endpoint = if database.port() == 3306 {
        database.endpoint_address().token()
    } else {
        format!("{}:{}", database.endpoint_address().token(), database.port())
    };
    let params = BootstrapParams {
        db_endpoint: endpoint,
        db_name: database.database_name().to_string(),
        db_user: credentials.username.clone(),
        db_password: credentials.password.clone(),
        site_domain: ctx.domain().to_string(),
        site_scheme: variant.site_scheme().to_string(),
        site_identity: variant.site_identity,
    };
    let renderer = renderer_for(variant.renderer);
    let script = build_bootstrap_script(&params, renderer.as_ref())?;

    let compute = launch_pool(
        &mut stack,
        ctx,
        LaunchRequest {
            script: &script,
            bootstrap: variant.bootstrap,
            network: &net.network,
            role: &net.role,
            firewall: &net.firewall,
            key: &key,
            database: &database,
            certificate: identity.certificate(),
            tls: variant.tls,
            spec: &config.compute,
        },
    )?;

    let zone_servers = identity.zone().resource().attr("name_servers");
    let routing =
        identity.bind_edge_routing(&mut stack, ctx, &compute.load_balancer, variant.edge)?;

    stack.validate()?;

    let mut outputs = BTreeMap::new();
    outputs.insert("site_url".to_string(), ctx.site_url(variant.site_scheme()));
    outputs.insert(
        "load_balancer_dns".to_string(),
        compute.load_balancer.dns_name().token(),
    );
    outputs.insert(
        "database_endpoint".to_string(),
        database.endpoint_address().token(),
    );
    outputs.insert("edge_target".to_string(), routing.target().token());
    outputs.insert("name_servers".to_string(), zone_servers.token());

    Ok(Assembly {
        stack,
        script,
        outputs,
    })
}
