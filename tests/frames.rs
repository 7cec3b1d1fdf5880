//! Wire-format tests against known-good LoRaWAN payloads.

use lorawan_ns::creator::JoinAcceptCreator;
use lorawan_ns::keys::{AppNonce, AppSKey, DevAddr, DevEui, DevNonce, NwkSKey, AES128};
use lorawan_ns::parser::{
    parse, AsPhyPayloadBytes, DataHeader, EncryptedDataPayload, EncryptedJoinAcceptPayload, MType,
    PhyPayload,
};
use lorawan_ns::Error;

fn phy_join_request_payload() -> Vec<u8> {
    vec![
        0x00, 0x04, 0x03, 0x02, 0x01, 0x04, 0x03, 0x02, 0x01, 0x05, 0x04, 0x03, 0x02, 0x05, 0x04,
        0x03, 0x02, 0x2d, 0x10, 0x6a, 0x99, 0x0e, 0x12,
    ]
}

fn phy_join_accept_payload() -> Vec<u8> {
    vec![
        0x20, 0x49, 0x3e, 0xeb, 0x51, 0xfb, 0xa2, 0x11, 0x6f, 0x81, 0x0e, 0xdb, 0x37, 0x42, 0x97,
        0x51, 0x42,
    ]
}

fn phy_dataup_payload() -> Vec<u8> {
    vec![
        0x40, 0x04, 0x03, 0x02, 0x01, 0x80, 0x01, 0x00, 0x01, 0xa6, 0x94, 0x64, 0x26, 0x15, 0xd6,
        0xc3, 0xb5, 0x82,
    ]
}

fn phy_datadown_payload() -> Vec<u8> {
    vec![
        0xa0, 0x04, 0x03, 0x02, 0x01, 0x80, 0xff, 0x2a, 0x2a, 0x0a, 0xf1, 0xa3, 0x6a, 0x05, 0xd0,
        0x12, 0x5f, 0x88, 0x5d, 0x88, 0x1d, 0x49, 0xe1,
    ]
}

fn phy_long_dataup_payload() -> Vec<u8> {
    vec![
        0x40, 0x04, 0x03, 0x02, 0x01, 0x00, 0x00, 0x00, 0x01, 0x27, 0x5a, 0xe9, 0x94, 0x2a, 0x58,
        0x32, 0x21, 0x48, 0xba, 0xd6, 0xca, 0x7d, 0x74, 0x6e, 0x77, 0x4a, 0xf8, 0x66, 0x7a, 0x7b,
        0x72, 0x36, 0x4b, 0xe4, 0xe1, 0x9d, 0x2f, 0x5c, 0x23, 0x98, 0x4f, 0xe2, 0x5e, 0x8e, 0x2d,
        0xdb, 0xd5, 0x15, 0xb5, 0x4e, 0xbe, 0x80, 0xce, 0xc2, 0x1c, 0xd6, 0x5a, 0x88, 0x13, 0x0f,
        0xbe, 0x6d, 0x04, 0xaa, 0xb2, 0xbc, 0x39, 0xab, 0xbe, 0xd9, 0xe8, 0x73, 0xef, 0xc7, 0x85,
        0xe5, 0x65, 0x5d, 0x62, 0x72, 0xf8, 0x79, 0x6b, 0x1e, 0x83, 0x9f, 0x2b, 0x1b, 0xde, 0xab,
        0xa2, 0x01, 0x6c, 0x7e, 0xf9, 0x16, 0x9d, 0x51, 0xf4, 0xea, 0x26, 0x1b, 0xc6, 0x08, 0x9c,
        0x83, 0xb3, 0x3c, 0x6f, 0x30, 0xa7, 0x3c, 0xe1, 0x3c, 0x52, 0x55, 0x7c, 0x46, 0xd7, 0x91,
        0xe7, 0xe0, 0x1b, 0x39, 0xe0, 0xb8, 0x9c, 0x1d, 0x2e, 0x35, 0x08, 0x84, 0x1b, 0x67, 0xe3,
        0xec, 0x88, 0x6f, 0x96, 0xeb, 0x0e, 0x11, 0x16, 0x40, 0xd3, 0xc1, 0x94, 0xf1, 0x21, 0x49,
        0xab, 0x58, 0x4b, 0xd9, 0x31, 0xdc, 0x15, 0xfc, 0x11, 0x94, 0x97, 0xdc, 0xcb, 0xf2, 0xb5,
        0xb9, 0x16, 0xb8, 0x52, 0x42, 0x96, 0x33, 0x41, 0xa5, 0x8b, 0xb5, 0x87, 0x7b, 0xd5, 0xaf,
        0x9e, 0xe4, 0x2d, 0x8b, 0x6f, 0x48, 0x45, 0x85, 0xa6, 0xf9, 0xcb, 0xaf, 0xf7, 0x2e, 0xe1,
        0x09, 0x42, 0xe1, 0x23, 0x8c, 0x98, 0xd7, 0xbf, 0xe7, 0xca, 0x0b, 0x2d, 0xb2, 0x24, 0x8d,
        0xb9, 0x1c, 0xd2, 0x3a, 0x71, 0xc6, 0xdb, 0x9b, 0x76, 0x8c, 0xf7, 0xef, 0x17, 0xf0, 0x51,
        0xcf, 0x42, 0x3e, 0x73, 0x47, 0x7a, 0xbc, 0x9b, 0x0f, 0xf0, 0x62, 0xde, 0x1e, 0x85, 0x20,
        0x29, 0x92, 0xdd, 0xca, 0x58, 0x37, 0x44, 0x19, 0x0c, 0x4f, 0xf7, 0xe1, 0xb4, 0x2e, 0xa3,
        0xcc,
    ]
}

fn long_data_payload() -> String {
    String::from(
        "Lorem ipsum dolor sit amet, consetetur sadipscing elitr, sed diam nonumy eirmod tempor \
            invidunt ut labore et dolore magna aliquyam erat, sed diam voluptua. At vero eos et \
            accusam et justo duo dolores et ea rebum. Stet clita kasd gubergren, not",
    )
}

fn app_key() -> AES128 {
    AES128([
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ])
}

#[test]
fn test_parse_join_request() {
    let phy = parse(phy_join_request_payload()).unwrap();
    let request = match phy {
        PhyPayload::JoinRequest(request) => request,
        other => panic!("expected join-request, got {other:?}"),
    };
    // EUIs come out reversed into canonical order
    assert_eq!(
        request.app_eui().as_ref(),
        &[0x01, 0x02, 0x03, 0x04, 0x01, 0x02, 0x03, 0x04]
    );
    assert_eq!(
        request.dev_eui(),
        DevEui::new([0x02, 0x03, 0x04, 0x05, 0x02, 0x03, 0x04, 0x05])
    );
    assert_eq!(request.dev_nonce(), DevNonce::new([0x2d, 0x10]));
    assert!(request.validate_mic(&AES128([1; 16])));
    assert!(!request.validate_mic(&AES128([2; 16])));
}

#[test]
fn test_join_accept_decrypt_and_derive() {
    let phy = EncryptedJoinAcceptPayload::new(phy_join_accept_payload()).unwrap();
    let decrypted = phy.decrypt(&app_key());
    assert!(decrypted.validate_mic(&app_key()));
    assert_eq!(decrypted.app_nonce(), AppNonce::new([0xc7, 0x0b, 0x57]));
    assert_eq!(decrypted.net_id(), [0x01, 0x11, 0x22]);
    assert_eq!(decrypted.dev_addr(), DevAddr::from(0x0203_1980));
    assert_eq!(decrypted.dl_settings().rx1_dr_offset(), 0);
    assert_eq!(decrypted.dl_settings().rx2_data_rate(), 0);
    assert_eq!(decrypted.rx_delay(), 0);

    let dev_nonce = DevNonce::new([0x2d, 0x10]);
    assert_eq!(
        decrypted.derive_nwkskey(&dev_nonce, &app_key()),
        NwkSKey::from([
            0x7b, 0xb2, 0x5f, 0x89, 0xe0, 0xd1, 0x37, 0x1e, 0x1f, 0xbf, 0x4d, 0x99, 0x7e, 0x14,
            0x68, 0xa3,
        ])
    );
    assert_eq!(
        decrypted.derive_appskey(&dev_nonce, &app_key()),
        AppSKey::from([
            0x14, 0x88, 0x20, 0xdf, 0xb1, 0xe0, 0xc9, 0xd6, 0x28, 0x9c, 0xde, 0x16, 0xc1, 0xaf,
            0x24, 0x9f,
        ])
    );
}

#[test]
fn test_join_accept_creator_roundtrip() {
    let key = AES128([9; 16]);
    let mut creator = JoinAcceptCreator::new();
    creator
        .set_app_nonce(&AppNonce::new([0xaa, 0xbb, 0xcc]))
        .set_net_id([0x00, 0x00, 0x13])
        .set_dev_addr(&DevAddr::from(0x2600_1110))
        .set_dl_settings(2, 5)
        .set_rx_delay(1);
    let frame = creator.build(&key);

    let decrypted = EncryptedJoinAcceptPayload::new(frame).unwrap().decrypt(&key);
    assert!(decrypted.validate_mic(&key));
    assert_eq!(decrypted.app_nonce(), AppNonce::new([0xaa, 0xbb, 0xcc]));
    assert_eq!(decrypted.net_id(), [0x00, 0x00, 0x13]);
    assert_eq!(decrypted.dev_addr(), DevAddr::from(0x2600_1110));
    assert_eq!(decrypted.dl_settings().rx1_dr_offset(), 2);
    assert_eq!(decrypted.dl_settings().rx2_data_rate(), 5);
    assert_eq!(decrypted.rx_delay(), 1);
}

#[test]
fn test_decrypt_dataup() {
    let phy = EncryptedDataPayload::new(phy_dataup_payload()).unwrap();
    assert_eq!(phy.mhdr().mtype(), MType::UnconfirmedDataUp);
    assert!(phy.validate_mic(&AES128([2; 16]), 1));

    let fhdr = phy.fhdr();
    assert_eq!(fhdr.dev_addr(), DevAddr::from(0x0102_0304));
    assert_eq!(fhdr.fcnt(), 1);
    assert!(fhdr.fctrl().adr());
    assert!(!fhdr.fctrl().ack());
    assert_eq!(fhdr.fctrl().f_opts_len(), 0);
    assert_eq!(phy.f_port(), Some(1));

    let decrypted = phy.decrypt(None, Some(&AppSKey::from([1; 16])), 1).unwrap();
    assert_eq!(decrypted.frm_payload(), b"hello");
}

#[test]
fn test_decrypt_long_dataup() {
    let phy = EncryptedDataPayload::new(phy_long_dataup_payload()).unwrap();
    assert!(phy.validate_mic(&AES128([2; 16]), 0));
    let decrypted = phy.decrypt(None, Some(&AppSKey::from([1; 16])), 0).unwrap();
    assert_eq!(decrypted.frm_payload(), long_data_payload().as_bytes());
}

#[test]
fn test_decrypt_datadown_with_32bit_fcnt() {
    let phy = EncryptedDataPayload::new(phy_datadown_payload()).unwrap();
    assert_eq!(phy.mhdr().mtype(), MType::ConfirmedDataDown);
    // the header carries only the low 16 bits of 76543
    assert_eq!(phy.fhdr().fcnt(), (76543 % 65536) as u16);
    assert!(phy.validate_mic(&AES128([2; 16]), 76543));
    assert_eq!(phy.f_port(), Some(42));

    let decrypted = phy.decrypt(None, Some(&AppSKey::from([1; 16])), 76543).unwrap();
    assert_eq!(decrypted.frm_payload(), b"hello lora");
}

#[test]
fn test_fopts_extraction_without_fport() {
    let data = vec![
        0x60, 0x5f, 0x3b, 0xd7, 0x4e, 0x0a, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x70, 0x03, 0x00,
        0xff, 0x00, 0x30, 0xcd, 0xdb, 0x22, 0xee,
    ];
    let phy = EncryptedDataPayload::new(data).unwrap();
    assert_eq!(phy.mhdr().mtype(), MType::UnconfirmedDataDown);
    assert_eq!(phy.f_port(), None);
    assert_eq!(
        phy.fhdr().fopts(),
        &[0x03, 0x00, 0x00, 0x00, 0x70, 0x03, 0x00, 0xff, 0x00, 0x30]
    );
}

#[test]
fn test_bare_fhdr_downlink_decrypts_without_payload() {
    let data = vec![
        0x60, 0x00, 0x00, 0x00, 0x48, 0x0a, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x70, 0x03, 0x00,
        0x00, 0xff, 0x00, 0xfc, 0x68, 0xf4, 0x5e,
    ];
    let phy = EncryptedDataPayload::new(data).unwrap();
    let nwk_skey = NwkSKey::from([1; 16]);
    assert!(phy.decrypt(Some(&nwk_skey), None, 0).is_ok());
}

#[test]
fn test_mic_is_last_four_bytes() {
    let phy = EncryptedDataPayload::new(phy_dataup_payload()).unwrap();
    assert_eq!(phy.mic().0, [0xd6, 0xc3, 0xb5, 0x82]);
}

#[test]
fn test_tampered_payload_fails_mic() {
    let mut bytes = phy_dataup_payload();
    bytes[8] ^= 0x01;
    let phy = EncryptedDataPayload::new(bytes).unwrap();
    assert!(!phy.validate_mic(&AES128([2; 16]), 1));
}

#[test]
fn test_parse_rejects_garbage() {
    assert_eq!(parse(vec![]), Err(Error::BadFrame));
    assert_eq!(parse(vec![0xc0; 23]), Err(Error::BadFrame));
    // FOptsLen pointing past the MIC
    let data = vec![0x40, 0x04, 0x03, 0x02, 0x01, 0x85, 0x01, 0x00, 0xd6, 0xc3, 0xb5, 0x82];
    assert_eq!(parse(data), Err(Error::BadFrame));
}
