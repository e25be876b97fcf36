use crate::config::catalog::ImageSource;
use crate::config::context::EffectiveContext;
use minijinja::{Environment, Error, ErrorKind};
use serde_json::{Map, Value};
use sha_crypt::{Sha512Params, sha512_simple};

/// Hashes a password into a SHA-512 crypt string. Empty input stays empty.
fn hash_password(value: String) -> Result<String, Error> {
    if value.is_empty() {
        return Ok(String::new());
    }
    sha512_simple(&value, &Sha512Params::default()).map_err(|err| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("unable to hash password: {err:?}"),
        )
    })
}

/// Variables visible to the boot script. Instance variables are layered
/// first so that the tool's own keys always win.
pub fn template_context(ctx: &EffectiveContext) -> Map<String, Value> {
    let mut values: Map<String, Value> = ctx
        .vars
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut set = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            values.insert(key.to_string(), value);
        }
    };

    set("vm_name", Some(ctx.vm_name.clone().into()));
    set("project_name", Some(ctx.project.clone().into()));
    set("spec_name", Some(ctx.spec.clone().into()));
    set("namespace", Some(ctx.namespace.clone().into()));
    set("cpu", Some(ctx.cpu.into()));
    set("memory", Some(ctx.memory.clone().into()));
    set("disk_size", Some(ctx.disk_size.clone().into()));
    set("storage_class", ctx.storage_class.clone().map(Value::from));
    set("username", ctx.auth.username.clone().map(Value::from));
    set("password", ctx.auth.password.clone().map(Value::from));
    if let ImageSource::Http(url) = &ctx.image {
        set("image_url", Some(url.clone().into()));
    }
    if let Some(derived) = &ctx.static_address {
        set("static_ip", Some(derived.static_ip.clone().into()));
        set("gateway_ip", derived.gateway_ip.clone().map(Value::from));
        set("interface_name", Some(derived.interface_name.clone().into()));
    }

    values
}

/// Renders the raw boot script against the instance context.
pub fn render(ctx: &EffectiveContext) -> Result<String, Error> {
    let mut env = Environment::new();
    env.add_filter("hash_password", hash_password);
    env.render_str(&ctx.boot_script, template_context(ctx))
}
