// Tests for the vegimeter2 declaration and the application model

use vegimeter::app::{
    AppError, Board, DistributorKind, Mapping, MappingRegistry, Port, Processor, Thread,
};
use vegimeter::vegimeter::{self as decl, declare};

#[test]
fn declaration_produces_one_vegimeter2_mapping() {
    let mut registry = MappingRegistry::new();
    registry.register(declare().unwrap()).unwrap();

    assert_eq!(registry.len(), 1);
    let mapping = registry.get("vegimeter2").unwrap();
    assert_eq!(mapping.name(), "vegimeter2");
}

#[test]
fn vegimeter2_has_a_single_engine_thread_on_port_10() {
    let mapping = declare().unwrap();
    assert_eq!(mapping.threads().len(), 1);

    let thread = &mapping.threads()[0];
    assert_eq!(thread.label, "ENGINE");
    assert_eq!(thread.entry_point, "engine_runner");
    assert_eq!(thread.port.number(), 10);
    assert_eq!(thread.port, Port::new(decl::ENGINE_PORT).unwrap());
}

#[test]
fn vegimeter2_runs_on_the_quickstart_processor() {
    let mapping = declare().unwrap();
    assert_eq!(mapping.processor(), &Board::new().get_processor());
    assert_eq!(mapping.distributor(), DistributorKind::RoundRobin);
    assert_eq!(mapping.placement().unwrap().core_of("ENGINE"), Some(0));
}

#[test]
fn declaring_twice_collides_in_one_registry() {
    let mut registry = MappingRegistry::new();
    registry.register(declare().unwrap()).unwrap();
    let err = registry.register(declare().unwrap()).unwrap_err();
    assert_eq!(err, AppError::DuplicateMapping("vegimeter2".to_string()));
    assert_eq!(registry.len(), 1);
}

#[test]
fn explicit_dummy_distributor_stacks_threads_on_core_zero() {
    let threads = vec![
        Thread::new("ENGINE", "engine_runner", Port::new(10).unwrap()),
        Thread::new("UI", "ui_runner", Port::new(11).unwrap()),
    ];
    let mapping = Mapping::new("vegimeter2", Processor::p8x32a(), threads)
        .unwrap()
        .with_distributor(DistributorKind::Dummy);
    let placement = mapping.placement().unwrap();
    assert_eq!(placement.threads_on(0), ["ENGINE", "UI"]);

    let round_robin = mapping.clone().with_distributor(DistributorKind::RoundRobin);
    assert_eq!(round_robin.placement().unwrap().core_of("UI"), Some(1));
}

#[test]
fn mapping_serializes_for_inspection() {
    let value = serde_json::to_value(declare().unwrap()).unwrap();
    assert_eq!(value["name"], "vegimeter2");
    assert_eq!(value["threads"][0]["port"], 10);
    assert_eq!(value["processor"]["cores"], 8);
}
