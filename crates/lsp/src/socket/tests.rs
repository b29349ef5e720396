use super::*;

#[tokio::test]
async fn closed_client_socket() {
	let socket = ClientSocket::new_closed();
	assert!(matches!(
		socket.notify::<lsp_types::notification::Exit>(()),
		Err(Error::ServiceStopped)
	));
	assert!(matches!(
		socket.request::<lsp_types::request::Shutdown>(()).await,
		Err(Error::ServiceStopped)
	));
	assert!(matches!(socket.emit(42i32), Err(Error::ServiceStopped)));
}

#[tokio::test]
async fn closed_server_socket() {
	let socket = ServerSocket::new_closed();
	assert!(matches!(
		socket.notify::<lsp_types::notification::Exit>(()),
		Err(Error::ServiceStopped)
	));
	assert!(matches!(socket.emit(42i32), Err(Error::ServiceStopped)));
}

#[tokio::test]
async fn request_resolves_from_its_slot() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let socket = ClientSocket(PeerSocket { tx });

	let pending = tokio::spawn({
		let socket = socket.clone();
		async move {
			socket
				.request::<lsp_types::request::ApplyWorkspaceEdit>(lsp_types::ApplyWorkspaceEditParams {
					label: Some("label".into()),
					edit: lsp_types::WorkspaceEdit::default(),
				})
				.await
		}
	});

	let Some(MainLoopEvent::OutgoingRequest(req, slot)) = rx.recv().await else {
		panic!("expected an outgoing request");
	};
	assert_eq!(req.method, "workspace/applyEdit");
	assert_eq!(req.params["label"], "label");
	slot.send(AnyResponse::new_ok(req.id, serde_json::json!({"applied": true})))
		.unwrap();

	let resp = pending.await.unwrap().unwrap();
	assert!(resp.applied);
}

#[tokio::test]
async fn dropped_slot_reports_service_stopped() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let socket = ClientSocket(PeerSocket { tx });

	let pending = tokio::spawn(async move { socket.request::<lsp_types::request::Shutdown>(()).await });
	let Some(MainLoopEvent::OutgoingRequest(_, slot)) = rx.recv().await else {
		panic!("expected an outgoing request");
	};
	drop(slot);

	assert!(matches!(pending.await.unwrap(), Err(Error::ServiceStopped)));
}
