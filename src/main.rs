use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use atlas_prep::report::{Reporter, TracingReporter};
use atlas_prep::session::Session;
use atlas_prep::settings::{self, CliArgs};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let settings = settings::load_config(&args)?;
    tracing::debug!("{}", settings);

    // failed actions are reported and skipped; the rest still run
    let reporter = TracingReporter;
    let mut session = Session::new(settings);

    if let Some(path) = session.settings.material_library.clone() {
        let _ = session.load_materials(&path, &reporter);
    }
    if let Some(project) = &args.project {
        let _ = session.open_project(project, &reporter);
        // explicit flags win over the project
        session.settings.apply_args(&args);
    }
    if let Some(mesh) = &args.mesh {
        let _ = session.load_mesh(mesh, &reporter);
    }
    if args.force_bounds {
        let _ = session.update_enclosure_now(&reporter);
    }
    for (part, material) in &args.assign {
        let _ = session.assign(part, material, &reporter);
    }

    for summary in session.part_summaries() {
        println!("{}", summary);
    }

    if let Some(path) = &args.save {
        let _ = session.save_project_as(path, &reporter);
    }
    if args.view {
        view(&session, &reporter);
    }

    Ok(())
}

#[cfg(feature = "visualization")]
fn view(session: &Session, _reporter: &dyn Reporter) {
    use atlas_prep::viewer::{self, Scene};

    viewer::show(Scene::from_session(session), "Atlas Prep");
}

#[cfg(not(feature = "visualization"))]
fn view(_session: &Session, reporter: &dyn Reporter) {
    reporter.error("Viewer not installed: rebuild with `--features visualization`.");
}
