mod common;

use opinion_sim::config::load_experiment_config_from_env;
use opinion_sim::{build_session_app, reference_community, run_session, ProtocolLog};

#[test]
fn app_initializes() {
    common::ensure_test_config();
    let (config, metadata) = load_experiment_config_from_env();
    assert!(metadata.path().is_some());

    let network = reference_community(config.community(), config.session().seed)
        .expect("reference community");
    let mut app = build_session_app(network, *config.session()).expect("session app");
    // one session must run the whole chain without faulting
    run_session(&mut app).expect("session");
    assert_eq!(app.world.resource::<ProtocolLog>().len(), 2);
}
