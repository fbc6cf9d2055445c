use tgmedia_tl::deserialize::Error;
use tgmedia_tl::{Deserializable, Identifiable, Serializable, enums, functions, peek_constructor, types};

// ── Primitives ────────────────────────────────────────────────────────────────

#[test]
fn bool_uses_boxed_constructors() {
    assert_eq!(true.to_bytes(), 0x997275b5u32.to_le_bytes());
    assert_eq!(false.to_bytes(), 0xbc799737u32.to_le_bytes());
    assert_eq!(
        bool::from_bytes(&0x12345678u32.to_le_bytes()),
        Err(Error::UnexpectedConstructor { id: 0x12345678 })
    );
}

#[test]
fn short_bytes_are_padded_to_four() {
    let bytes = b"abc".to_vec().to_bytes();
    assert_eq!(bytes, vec![3, b'a', b'b', b'c']);

    let bytes = b"abcd".to_vec().to_bytes();
    assert_eq!(bytes.len(), 8);
    assert_eq!(&bytes[5..], &[0, 0, 0]);
}

#[test]
fn long_bytes_use_four_byte_header() {
    let v = vec![7u8; 300];
    let bytes = v.to_bytes();
    assert_eq!(&bytes[..4], &[0xfe, 0x2c, 0x01, 0x00]);
    assert_eq!(bytes.len() % 4, 0);
    assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), v);
}

#[test]
fn invalid_utf8_is_reported() {
    let bytes = vec![0xffu8, 0xfe].to_bytes();
    assert_eq!(String::from_bytes(&bytes), Err(Error::InvalidUtf8));
}

#[test]
fn truncated_input_is_eof() {
    assert_eq!(i32::from_bytes(&[0x01, 0x02]), Err(Error::UnexpectedEof));
    // announces 10 bytes, carries 3
    assert_eq!(Vec::<u8>::from_bytes(&[10, 1, 2, 3]), Err(Error::UnexpectedEof));
}

#[test]
fn absurd_vector_length_is_rejected() {
    let mut bytes = 0x1cb5c415u32.to_le_bytes().to_vec();
    bytes.extend(i32::MAX.to_le_bytes());
    assert_eq!(
        Vec::<i64>::from_bytes(&bytes),
        Err(Error::LengthOverflow { len: i32::MAX })
    );
}

// ── Schema objects ───────────────────────────────────────────────────────────

#[test]
fn object_starts_with_constructor_id() {
    let ping = functions::Ping { ping_id: 0x0102030405060708 };
    let bytes = ping.to_bytes();
    assert_eq!(&bytes[..4], &0x7abe77ecu32.to_le_bytes());
    assert_eq!(&bytes[4..], &0x0102030405060708i64.to_le_bytes());
    assert_eq!(peek_constructor(&bytes).unwrap(), functions::Ping::CONSTRUCTOR_ID);
}

#[test]
fn wrong_constructor_is_rejected() {
    let bytes = types::MsgsAck { msg_ids: vec![1, 2] }.to_bytes();
    assert_eq!(
        types::Pong::from_bytes(&bytes),
        Err(Error::UnexpectedConstructor { id: types::MsgsAck::CONSTRUCTOR_ID })
    );
}

#[test]
fn enum_dispatches_on_constructor() {
    let photo = types::Photo {
        id: 11,
        access_hash: 22,
        file_reference: vec![1, 2, 3],
        date: 1_700_000_000,
        sizes: vec![
            enums::PhotoSize::Size(types::PhotoSize { kind: "y".into(), w: 800, h: 600, size: 4096 }),
        ],
    };
    let msg = enums::Message::Message(types::Message {
        id: 42,
        peer_id: types::PeerChannel { channel_id: 9 }.into(),
        date: 1_700_000_001,
        message: "caption".into(),
        media: types::MessageMediaPhoto { photo: photo.into() }.into(),
    });

    let decoded = enums::Message::from_bytes(&msg.to_bytes()).unwrap();
    assert_eq!(decoded, msg);
    assert_eq!(decoded.id(), 42);
}

#[test]
fn unknown_enum_constructor_is_rejected() {
    let bytes = types::PeerUser { user_id: 1 }.to_bytes();
    assert!(matches!(
        enums::MessageMedia::from_bytes(&bytes),
        Err(Error::UnexpectedConstructor { .. })
    ));
}

#[test]
fn messages_variants_expose_messages() {
    let slice = enums::messages::Messages::Slice(types::messages::MessagesSlice {
        count: 100,
        messages: vec![enums::Message::Empty(types::MessageEmpty { id: 3 })],
        chats: vec![],
        users: vec![],
    });
    assert_eq!(slice.into_messages().len(), 1);

    let none = enums::messages::Messages::NotModified(types::messages::MessagesNotModified { count: 0 });
    assert!(none.into_messages().is_empty());
}

#[test]
fn functions_deserialize_for_server_side_use() {
    let req = functions::messages::Search {
        peer: types::InputPeerSelf {}.into(),
        q: String::new(),
        filter: types::InputMessagesFilterVideo {}.into(),
        min_date: 0,
        max_date: 0,
        offset_id: 500,
        add_offset: 0,
        limit: 20,
        max_id: 0,
        min_id: 0,
        hash: 0,
    };
    let back = functions::messages::Search::from_bytes(&req.to_bytes()).unwrap();
    assert_eq!(back, req);
}
