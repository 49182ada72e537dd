use api::{ApplicationMarker, Bot, Config, Database, Discord, GuildMarker, Id, NoTls, VerifyingKey};
use core::{convert::Infallible, num::NonZeroU64, time::Duration};
use http_body_util::Full;
use hyper::{server::conn::http1, service::service_fn, Response};
use hyper_util::rt::TokioIo;
use std::{
    env,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::{net::TcpListener, runtime::Runtime};

/// How often expired polls are swept from the database (in seconds).
const PURGE_INTERVAL: NonZeroU64 = match NonZeroU64::new(60 * 60) {
    Some(secs) => secs,
    None => panic!("purge interval must be positive"),
};

fn optional<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: core::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Parse environment variables
    let port: u16 = env::var("PORT")?.parse()?;
    let app: Id<ApplicationMarker> = env::var("APP_ID")?.parse()?;
    let token = env::var("BOT_TOKEN")?;
    let guild = match env::var("GUILD_ID") {
        Ok(guild) => Some(guild.parse::<Id<GuildMarker>>()?),
        _ => None,
    };
    let ttl = optional("POLL_TTL", api::TTL)?;
    let purge = optional::<NonZeroU64>("PURGE_INTERVAL", PURGE_INTERVAL)?;

    let mut public = [0; 32];
    hex::decode_to_slice(env::var("PUB_KEY")?, &mut public)?;
    let public = VerifyingKey::from_bytes(&public)?;

    let mut config = Config::new();
    config
        .user(&env::var("PG_USERNAME")?)
        .password(env::var("PG_PASSWORD")?)
        .host(&env::var("PG_HOSTNAME")?)
        .dbname(&env::var("PG_DATABASE")?)
        .port(optional("PG_PORT", 5432)?);

    let runtime = Runtime::new()?;
    runtime.block_on(async {
        // Connect to the database
        let (client, conn) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                log::error!("database connection closed: {err}");
            }
        });
        let db = Database::from(client);
        db.init_schema().await.map_err(anyhow::Error::msg)?;

        // Register the slash command
        let discord = Discord::new(token);
        api::command::register(&discord, app, guild).await?;
        drop(discord);

        let bot = Arc::new(Bot::new(db, ttl));
        let public = Arc::new(public);

        // Sweep expired polls in the background
        let sweeper = bot.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(purge.get()));
            loop {
                interval.tick().await;
                match sweeper.polls().purge(api::now()).await {
                    Ok(0) => {}
                    Ok(count) => log::info!("purged {count} expired polls"),
                    Err(err) => log::warn!("failed to purge expired polls: {err}"),
                }
            }
        });

        // Run the server
        let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
        let listener = TcpListener::bind(addr).await?;
        log::info!("listening on {addr}");

        let mut stop = core::pin::pin!(tokio::signal::ctrl_c());
        loop {
            let (stream, _) = tokio::select! {
                biased;
                res = &mut stop => {
                    res?;
                    break;
                }
                res = listener.accept() => res?,
            };

            let bot = bot.clone();
            let public = public.clone();
            let service = service_fn(move |req| {
                let bot = bot.clone();
                let public = public.clone();
                async move {
                    let res = match api::interaction::try_respond(req, &bot, &public).await {
                        Ok(res) => res,
                        Err(code) => {
                            let mut res = Response::new(Full::default());
                            *res.status_mut() = code;
                            res
                        }
                    };
                    Ok::<_, Infallible>(res)
                }
            });

            tokio::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                    log::error!("failed to serve connection: {err}");
                }
            });
        }

        log::info!("shutting down");
        anyhow::Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::{optional, PURGE_INTERVAL};
    use core::num::NonZeroU64;
    use std::env;

    #[test]
    fn purge_interval_must_be_positive() {
        const NAME: &str = "POLLSTER_TEST_PURGE_INTERVAL";

        env::remove_var(NAME);
        assert_eq!(optional::<NonZeroU64>(NAME, PURGE_INTERVAL).unwrap(), PURGE_INTERVAL);

        env::set_var(NAME, "30");
        assert_eq!(optional::<NonZeroU64>(NAME, PURGE_INTERVAL).unwrap().get(), 30);

        env::set_var(NAME, "0");
        assert!(optional::<NonZeroU64>(NAME, PURGE_INTERVAL).is_err());

        env::remove_var(NAME);
    }
}
