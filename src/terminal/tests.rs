//! 终端模块单元测试
//!
//! 使用内存中的传输与模拟器驱动会话控制器。
//!
//! ## 测试覆盖
//! - 打开/关闭的幂等性
//! - 初始握手与尺寸重同步
//! - 输入输出顺序
//! - 远端关闭后的拆除与重新打开

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::super::emulator::{Emulator, EmulatorConfig, EmulatorFactory};
    use super::super::error::TerminalError;
    use super::super::events::SessionState;
    use super::super::frame::WireMessage;
    use super::super::geometry::Geometry;
    use super::super::session::{TerminalSession, SESSION_ENDED_TRAILER};
    use super::super::transport::{Connector, EventSink, SessionEvent, Transport};
    use super::super::driver::spawn_session;

    // ========================================================================
    // 测试替身
    // ========================================================================

    #[derive(Default)]
    struct Recorder {
        /// 按传输实例记录的出站消息
        sent: Vec<Vec<WireMessage>>,
        transports_created: usize,
        transports_closed: usize,
        emulators_created: usize,
        emulators_disposed: usize,
        /// 按模拟器实例记录的输出
        output: Vec<Vec<u8>>,
        transport_sinks: Vec<EventSink>,
        emulator_sinks: Vec<EventSink>,
        viewports: Vec<Geometry>,
        /// 为 true 时所有发送失败
        broken: bool,
        /// 模拟器剩余可接收的字节数，`None` 表示不限
        budget: Option<usize>,
        /// 释放时各模拟器已收到的输出长度
        output_at_dispose: Vec<usize>,
    }

    impl Recorder {
        fn live_transports(&self) -> usize {
            self.transports_created - self.transports_closed
        }

        fn live_emulators(&self) -> usize {
            self.emulators_created - self.emulators_disposed
        }

        fn last_sent(&self) -> &[WireMessage] {
            self.sent.last().map(Vec::as_slice).unwrap_or(&[])
        }

        fn last_output(&self) -> &[u8] {
            self.output.last().map(Vec::as_slice).unwrap_or(&[])
        }
    }

    type Shared = Arc<Mutex<Recorder>>;

    struct FakeTransport {
        recorder: Shared,
        index: usize,
        closed: bool,
    }

    impl Transport for FakeTransport {
        fn send(&mut self, message: WireMessage) -> Result<(), TerminalError> {
            let mut recorder = self.recorder.lock();
            if self.closed || recorder.broken {
                return Err(TerminalError::TransportClosed);
            }
            recorder.sent[self.index].push(message);
            Ok(())
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.recorder.lock().transports_closed += 1;
            }
        }
    }

    struct FakeConnector {
        recorder: Shared,
        fail: bool,
    }

    impl Connector for FakeConnector {
        fn connect(&self, sink: EventSink) -> Result<Box<dyn Transport>, TerminalError> {
            if self.fail {
                return Err(TerminalError::TransportConnectFailed("refused".to_string()));
            }
            let mut recorder = self.recorder.lock();
            recorder.transports_created += 1;
            recorder.sent.push(Vec::new());
            recorder.transport_sinks.push(sink);
            Ok(Box::new(FakeTransport {
                recorder: self.recorder.clone(),
                index: recorder.sent.len() - 1,
                closed: false,
            }))
        }
    }

    struct FakeEmulator {
        recorder: Shared,
        index: usize,
        geometry: Geometry,
        disposed: bool,
    }

    impl Emulator for FakeEmulator {
        fn geometry(&self) -> Geometry {
            self.geometry
        }

        fn write_output(&mut self, data: &[u8]) -> usize {
            let mut recorder = self.recorder.lock();
            let accepted = match recorder.budget.as_mut() {
                Some(budget) => {
                    let accepted = (*budget).min(data.len());
                    *budget -= accepted;
                    accepted
                }
                None => data.len(),
            };
            recorder.output[self.index].extend_from_slice(&data[..accepted]);
            accepted
        }

        fn dispose(&mut self) {
            if !self.disposed {
                self.disposed = true;
                let mut recorder = self.recorder.lock();
                recorder.emulators_disposed += 1;
                let written = recorder.output[self.index].len();
                recorder.output_at_dispose.push(written);
            }
        }
    }

    struct FakeEmulatorFactory {
        recorder: Shared,
    }

    impl EmulatorFactory for FakeEmulatorFactory {
        fn create(
            &self,
            _config: &EmulatorConfig,
            viewport: Geometry,
            sink: EventSink,
        ) -> Box<dyn Emulator> {
            let mut recorder = self.recorder.lock();
            recorder.emulators_created += 1;
            recorder.output.push(Vec::new());
            recorder.emulator_sinks.push(sink);
            recorder.viewports.push(viewport);
            Box::new(FakeEmulator {
                recorder: self.recorder.clone(),
                index: recorder.output.len() - 1,
                geometry: viewport,
                disposed: false,
            })
        }
    }

    fn session_with(fail: bool) -> (TerminalSession, Shared) {
        let recorder: Shared = Arc::default();
        let (session, _events) = TerminalSession::new(
            Arc::new(FakeConnector {
                recorder: recorder.clone(),
                fail,
            }),
            Arc::new(FakeEmulatorFactory {
                recorder: recorder.clone(),
            }),
            Arc::new(EmulatorConfig::default()),
            Geometry::default(),
        );
        (session, recorder)
    }

    fn new_session() -> (TerminalSession, Shared) {
        session_with(false)
    }

    fn connected_session() -> (TerminalSession, Shared) {
        let (mut session, recorder) = new_session();
        session.open();
        establish(&mut session);
        (session, recorder)
    }

    fn establish(session: &mut TerminalSession) {
        let epoch = session.epoch();
        session.handle(epoch, SessionEvent::TransportEstablished);
    }

    fn emit(session: &mut TerminalSession, event: SessionEvent) {
        let epoch = session.epoch();
        session.handle(epoch, event);
    }

    fn resize_text(cols: u16, rows: u16) -> WireMessage {
        WireMessage::Text(format!(r#"{{"type":"resize","cols":{cols},"rows":{rows}}}"#))
    }

    fn binary(data: &[u8]) -> WireMessage {
        WireMessage::Binary(Bytes::copy_from_slice(data))
    }

    // ========================================================================
    // 打开与关闭
    // ========================================================================

    #[test]
    fn test_new_session_is_idle() {
        let (session, recorder) = new_session();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(recorder.lock().transports_created, 0);
        assert_eq!(recorder.lock().emulators_created, 0);
    }

    #[test]
    fn test_open_enters_connecting_then_connected() {
        let (mut session, recorder) = new_session();
        session.open();
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(recorder.lock().live_transports(), 1);
        assert_eq!(recorder.lock().live_emulators(), 1);

        establish(&mut session);
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.is_connected());
    }

    #[test]
    fn test_open_is_idempotent_while_connecting() {
        let (mut session, recorder) = new_session();
        session.open();
        session.open();
        session.open();
        let recorder = recorder.lock();
        assert_eq!(recorder.transports_created, 1);
        assert_eq!(recorder.emulators_created, 1);
    }

    #[test]
    fn test_open_is_idempotent_while_connected() {
        let (mut session, recorder) = connected_session();
        session.open();
        assert_eq!(session.state(), SessionState::Connected);
        let recorder = recorder.lock();
        assert_eq!(recorder.transports_created, 1);
        assert_eq!(recorder.emulators_created, 1);
        assert_eq!(recorder.live_transports(), 1);
        assert_eq!(recorder.live_emulators(), 1);
    }

    #[test]
    fn test_close_is_idempotent_in_every_state() {
        // Idle
        let (mut session, recorder) = new_session();
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(recorder.lock().live_transports(), 0);

        // Connecting
        let (mut session, recorder) = new_session();
        session.open();
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(recorder.lock().live_transports(), 0);
        assert_eq!(recorder.lock().live_emulators(), 0);

        // Connected
        let (mut session, recorder) = connected_session();
        for _ in 0..3 {
            session.close();
        }
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(recorder.lock().live_transports(), 0);
        assert_eq!(recorder.lock().live_emulators(), 0);
    }

    #[test]
    fn test_user_close_is_silent() {
        let (mut session, recorder) = connected_session();
        session.close();
        assert!(recorder.lock().last_output().is_empty());
    }

    #[test]
    fn test_connect_completing_after_close_is_ignored() {
        let (mut session, recorder) = new_session();
        session.open();
        let stale = session.epoch();
        session.close();

        session.handle(stale, SessionEvent::TransportEstablished);
        assert_eq!(session.state(), SessionState::Closed);
        let recorder = recorder.lock();
        assert_eq!(recorder.live_transports(), 0);
        assert!(recorder.last_sent().is_empty());
    }

    #[test]
    fn test_immediate_connect_failure_closes_with_trailer() {
        let (mut session, recorder) = session_with(true);
        session.open();
        assert_eq!(session.state(), SessionState::Closed);
        let recorder = recorder.lock();
        assert_eq!(recorder.live_emulators(), 0);
        assert_eq!(recorder.last_output(), SESSION_ENDED_TRAILER.as_bytes());
    }

    #[test]
    fn test_establishment_failure_closes_with_trailer() {
        let (mut session, recorder) = new_session();
        session.open();
        emit(
            &mut session,
            SessionEvent::TransportClosed {
                reason: Some("connection refused".to_string()),
            },
        );
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(recorder.lock().last_output(), SESSION_ENDED_TRAILER.as_bytes());
        assert_eq!(recorder.lock().live_transports(), 0);
    }

    // ========================================================================
    // 尺寸同步
    // ========================================================================

    #[test]
    fn test_handshake_precedes_data() {
        let (mut session, recorder) = new_session();
        session.open();
        // 连接建立前输入的按键
        emit(&mut session, SessionEvent::Input(Bytes::from_static(b"l")));
        establish(&mut session);
        emit(&mut session, SessionEvent::Input(Bytes::from_static(b"s")));

        let recorder = recorder.lock();
        assert_eq!(
            recorder.last_sent(),
            &[resize_text(80, 24), binary(b"l"), binary(b"s")]
        );
    }

    #[test]
    fn test_geometry_change_while_connected_sends_one_frame() {
        let (mut session, recorder) = connected_session();
        emit(&mut session, SessionEvent::Resized { cols: 120, rows: 40 });
        emit(&mut session, SessionEvent::Resized { cols: 120, rows: 40 });

        let recorder = recorder.lock();
        assert_eq!(
            recorder.last_sent(),
            &[resize_text(80, 24), resize_text(120, 40)]
        );
    }

    #[test]
    fn test_geometry_change_while_disconnected_is_resent_on_open() {
        let (mut session, recorder) = connected_session();
        session.close();
        let sent_before = recorder.lock().sent.iter().map(Vec::len).sum::<usize>();

        session.set_viewport(Geometry::new(120, 40).unwrap());
        let sent_after = recorder.lock().sent.iter().map(Vec::len).sum::<usize>();
        assert_eq!(sent_before, sent_after);

        session.open();
        establish(&mut session);
        let recorder = recorder.lock();
        assert_eq!(recorder.viewports.last(), Some(&Geometry::new(120, 40).unwrap()));
        assert_eq!(recorder.last_sent(), &[resize_text(120, 40)]);
    }

    #[test]
    fn test_resize_while_connecting_is_not_sent() {
        let (mut session, recorder) = new_session();
        session.open();
        emit(&mut session, SessionEvent::Resized { cols: 100, rows: 30 });
        assert!(recorder.lock().last_sent().is_empty());
        assert_eq!(session.geometry(), Geometry::new(100, 30).unwrap());
    }

    #[test]
    fn test_zero_geometry_report_is_ignored() {
        let (mut session, recorder) = connected_session();
        emit(&mut session, SessionEvent::Resized { cols: 0, rows: 40 });
        assert_eq!(recorder.lock().last_sent(), &[resize_text(80, 24)]);
        assert_eq!(session.state(), SessionState::Connected);
    }

    // ========================================================================
    // 输入输出
    // ========================================================================

    #[test]
    fn test_keystroke_becomes_single_binary_frame() {
        let (mut session, recorder) = connected_session();
        emit(&mut session, SessionEvent::Input(Bytes::from_static(b"ls\r")));

        let recorder = recorder.lock();
        let sent = recorder.last_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], WireMessage::Binary(Bytes::from_static(&[0x6c, 0x73, 0x0d])));
    }

    #[test]
    fn test_inbound_data_reaches_emulator_unaltered() {
        let (mut session, recorder) = connected_session();
        emit(
            &mut session,
            SessionEvent::TransportMessage(binary(b"file.txt\r\n")),
        );
        assert_eq!(recorder.lock().last_output(), b"file.txt\r\n");
    }

    #[test]
    fn test_malformed_control_message_is_dropped() {
        let (mut session, recorder) = connected_session();
        emit(
            &mut session,
            SessionEvent::TransportMessage(WireMessage::Text("{oops".to_string())),
        );
        emit(&mut session, SessionEvent::TransportMessage(binary(b"ok")));
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(recorder.lock().last_output(), b"ok");
    }

    #[test]
    fn test_server_error_frame_is_rendered() {
        let (mut session, recorder) = connected_session();
        emit(
            &mut session,
            SessionEvent::TransportMessage(WireMessage::Text(
                r#"{"type":"error","message":"failed to start terminal"}"#.to_string(),
            )),
        );
        let recorder = recorder.lock();
        let output = String::from_utf8_lossy(recorder.last_output()).to_string();
        assert!(output.contains("failed to start terminal"));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_untagged_server_error_is_rendered() {
        let (mut session, recorder) = connected_session();
        emit(
            &mut session,
            SessionEvent::TransportMessage(WireMessage::Text(
                r#"{"error":"no pty available"}"#.to_string(),
            )),
        );
        let recorder = recorder.lock();
        let output = String::from_utf8_lossy(recorder.last_output()).to_string();
        assert!(output.contains("no pty available"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_input_and_output_preserve_order(
            keys in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..8), 0..20),
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..32), 0..20),
        ) {
            let (mut session, recorder) = connected_session();
            // 两个方向交错到达
            for i in 0..keys.len().max(chunks.len()) {
                if let Some(key) = keys.get(i) {
                    emit(&mut session, SessionEvent::Input(Bytes::from(key.clone())));
                }
                if let Some(chunk) = chunks.get(i) {
                    emit(&mut session, SessionEvent::TransportMessage(binary(chunk)));
                }
            }

            let recorder = recorder.lock();
            let outbound: Vec<u8> = recorder.last_sent()[1..]
                .iter()
                .flat_map(|m| match m {
                    WireMessage::Binary(b) => b.to_vec(),
                    WireMessage::Text(t) => panic!("unexpected control frame {t}"),
                })
                .collect();
            prop_assert_eq!(outbound, keys.concat());
            prop_assert_eq!(recorder.last_output().to_vec(), chunks.concat());
        }
    }

    // ========================================================================
    // 远端关闭与重新打开
    // ========================================================================

    #[test]
    fn test_remote_close_tears_down_with_trailer() {
        let (mut session, recorder) = connected_session();
        emit(&mut session, SessionEvent::TransportMessage(binary(b"bye\r\n")));
        emit(&mut session, SessionEvent::TransportClosed { reason: None });

        assert_eq!(session.state(), SessionState::Closed);
        let recorder = recorder.lock();
        assert_eq!(recorder.live_transports(), 0);
        assert_eq!(recorder.live_emulators(), 0);
        let mut expected = b"bye\r\n".to_vec();
        expected.extend_from_slice(SESSION_ENDED_TRAILER.as_bytes());
        assert_eq!(recorder.last_output(), expected.as_slice());
    }

    #[test]
    fn test_remote_close_under_backpressure_keeps_trailer() {
        let (mut session, recorder) = connected_session();
        recorder.lock().budget = Some(2);
        emit(&mut session, SessionEvent::TransportMessage(binary(b"hello")));
        emit(&mut session, SessionEvent::TransportClosed { reason: None });

        assert_eq!(session.state(), SessionState::Closed);
        {
            let recorder = recorder.lock();
            assert_eq!(recorder.live_transports(), 0);
            // 剩余输出写完前模拟器不会被释放
            assert_eq!(recorder.live_emulators(), 1);
            assert_eq!(recorder.last_output(), b"he");
        }

        // 模拟器逐步恢复
        recorder.lock().budget = Some(4);
        emit(&mut session, SessionEvent::OutputDrained);
        assert_eq!(recorder.lock().live_emulators(), 1);

        recorder.lock().budget = None;
        emit(&mut session, SessionEvent::OutputDrained);

        let recorder = recorder.lock();
        let mut expected = b"hello".to_vec();
        expected.extend_from_slice(SESSION_ENDED_TRAILER.as_bytes());
        assert_eq!(recorder.last_output(), expected.as_slice());
        assert_eq!(recorder.live_emulators(), 0);
        assert_eq!(recorder.output_at_dispose, vec![expected.len()]);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_reopen_abandons_unfinished_output() {
        let (mut session, recorder) = connected_session();
        recorder.lock().budget = Some(0);
        emit(&mut session, SessionEvent::TransportMessage(binary(b"stale")));
        emit(&mut session, SessionEvent::TransportClosed { reason: None });
        assert_eq!(recorder.lock().live_emulators(), 1);

        recorder.lock().budget = None;
        session.open();
        // 新纪元开始后旧的排空通知不再生效
        session.handle(1, SessionEvent::OutputDrained);
        establish(&mut session);

        let recorder = recorder.lock();
        assert_eq!(recorder.live_emulators(), 1);
        assert_eq!(recorder.output[0], Vec::<u8>::new());
        assert!(recorder.last_output().is_empty());
    }

    #[test]
    fn test_close_discards_unfinished_output() {
        let (mut session, recorder) = connected_session();
        recorder.lock().budget = Some(0);
        emit(&mut session, SessionEvent::TransportMessage(binary(b"pending")));
        emit(&mut session, SessionEvent::TransportClosed { reason: None });

        session.close();
        emit(&mut session, SessionEvent::OutputDrained);

        let recorder = recorder.lock();
        assert_eq!(recorder.live_emulators(), 0);
        assert!(recorder.last_output().is_empty());
    }

    #[test]
    fn test_no_reconnect_without_open() {
        let (mut session, recorder) = connected_session();
        emit(&mut session, SessionEvent::TransportClosed { reason: None });
        // 旧纪元的事件不会复活会话
        session.handle(1, SessionEvent::TransportEstablished);
        session.handle(1, SessionEvent::Input(Bytes::from_static(b"x")));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(recorder.lock().transports_created, 1);
    }

    #[test]
    fn test_reopen_creates_distinct_pair_without_carryover() {
        let (mut session, recorder) = connected_session();
        let first_epoch = session.epoch();
        emit(&mut session, SessionEvent::TransportClosed { reason: None });

        session.open();
        assert_eq!(session.state(), SessionState::Connecting);
        assert_ne!(session.epoch(), first_epoch);

        // 旧传输迟到的数据被丢弃
        session.handle(first_epoch, SessionEvent::TransportMessage(binary(b"late")));
        establish(&mut session);

        let recorder = recorder.lock();
        assert_eq!(recorder.transports_created, 2);
        assert_eq!(recorder.emulators_created, 2);
        assert_eq!(recorder.live_transports(), 1);
        assert_eq!(recorder.live_emulators(), 1);
        assert!(recorder.last_output().is_empty());
        assert_eq!(recorder.last_sent(), &[resize_text(80, 24)]);
    }

    #[test]
    fn test_send_failure_is_treated_as_closure() {
        let (mut session, recorder) = connected_session();
        recorder.lock().broken = true;
        emit(&mut session, SessionEvent::Input(Bytes::from_static(b"x")));

        assert_eq!(session.state(), SessionState::Closed);
        let recorder = recorder.lock();
        assert_eq!(recorder.live_transports(), 0);
        assert_eq!(recorder.live_emulators(), 0);
        assert_eq!(recorder.last_output(), SESSION_ENDED_TRAILER.as_bytes());
    }

    // ========================================================================
    // 驱动任务
    // ========================================================================

    #[tokio::test]
    async fn test_driver_runs_session_lifecycle() {
        let recorder: Shared = Arc::default();
        let (session, events) = TerminalSession::new(
            Arc::new(FakeConnector {
                recorder: recorder.clone(),
                fail: false,
            }),
            Arc::new(FakeEmulatorFactory {
                recorder: recorder.clone(),
            }),
            Arc::new(EmulatorConfig::default()),
            Geometry::default(),
        );
        let mut handle = spawn_session(session, events);
        assert_eq!(handle.state(), SessionState::Idle);

        handle.open();
        handle
            .wait_for(|s| s == SessionState::Connecting)
            .await;

        let transport_sink = recorder.lock().transport_sinks[0].clone();
        transport_sink.established();
        handle.wait_for(|s| s == SessionState::Connected).await;

        let emulator_sink = recorder.lock().emulator_sinks[0].clone();
        emulator_sink.input(Bytes::from_static(b"ls\r"));
        transport_sink.message(binary(b"file.txt\r\n"));
        transport_sink.closed(None);
        handle.wait_for(|s| s == SessionState::Closed).await;

        {
            let recorder = recorder.lock();
            assert_eq!(recorder.last_sent(), &[resize_text(80, 24), binary(b"ls\r")]);
            let mut expected = b"file.txt\r\n".to_vec();
            expected.extend_from_slice(SESSION_ENDED_TRAILER.as_bytes());
            assert_eq!(recorder.last_output(), expected.as_slice());
        }

        handle.open();
        handle
            .wait_for(|s| s == SessionState::Connecting)
            .await;
        assert_eq!(recorder.lock().transports_created, 2);
        assert_eq!(handle.epoch(), 2);

        handle.shutdown().await;
        assert_eq!(recorder.lock().live_transports(), 0);
        assert_eq!(recorder.lock().live_emulators(), 0);
    }
}
