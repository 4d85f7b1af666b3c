use shnn_core::{ConnectionConfig, Error, LayerConfig, NetworkBuilder, Opcode};

#[test]
fn two_structure_network_with_cross_structure_connection() {
    let mut b = NetworkBuilder::new();
    let s1 = b.add_structure("s1");
    let s2 = b.add_structure("s2");

    let a = b.add_layer(s1, LayerConfig::new("float", 2, 2)).unwrap();
    let out = b.add_layer(s2, LayerConfig::new("float", 2, 2)).unwrap();

    let conn = b
        .connect(ConnectionConfig::one_to_one(a, out, Opcode::Add))
        .unwrap();

    let net = b.build();
    assert_eq!(net.structures().len(), 2);
    assert_eq!(net.layers().len(), 2);
    assert_eq!(net.connection(conn).weight_count(), 4);
    assert_eq!(net.layer(a).output_connections(), &[conn]);
    assert_eq!(net.layer(out).input_connections(), &[conn]);
}

#[test]
fn convolutional_field_larger_than_destination_is_invalid_topology() {
    use shnn_core::ShapeConfig;

    let mut b = NetworkBuilder::new();
    let s = b.add_structure("s");
    let input = b.add_layer(s, LayerConfig::new("float", 5, 5)).unwrap();
    let out = b.add_layer(s, LayerConfig::new("float", 2, 2)).unwrap();

    let cfg = ConnectionConfig::fully_connected(input, out, Opcode::Add).with_arborized_shape(
        shnn_core::ConnectionType::Convolutional,
        ShapeConfig::Arborized {
            field_rows: 3,
            field_columns: 3,
            stride_rows: 1,
            stride_columns: 1,
            offset_rows: 0,
            offset_columns: 0,
        },
    );

    let err = b.connect(cfg).unwrap_err();
    assert!(matches!(err, Error::InvalidTopology { .. }));
}

#[test]
fn convolutional_weight_count_is_one_shared_kernel() {
    use shnn_core::ShapeConfig;

    let mut b = NetworkBuilder::new();
    let s = b.add_structure("s");
    let input = b.add_layer(s, LayerConfig::new("float", 5, 5)).unwrap();
    let out = b.add_layer(s, LayerConfig::new("float", 3, 3)).unwrap();

    let cfg = ConnectionConfig::fully_connected(input, out, Opcode::Add).with_arborized_shape(
        shnn_core::ConnectionType::Convolutional,
        ShapeConfig::Arborized {
            field_rows: 3,
            field_columns: 3,
            stride_rows: 1,
            stride_columns: 1,
            offset_rows: 0,
            offset_columns: 0,
        },
    );

    let conn = b.connect(cfg).unwrap();
    let net = b.build();
    assert_eq!(net.connection(conn).weight_count(), 9);
}
